use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Histogram, HistogramVec, IntCounter, IntCounterVec,
};

lazy_static::lazy_static! {
    pub static ref STORAGE_OP_DURATION: HistogramVec = register_histogram_vec!(
        "cumulus_storage_operation_duration_seconds", "Storage operation latency",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
    pub static ref STORAGE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cumulus_storage_errors_total", "Storage operation errors", &["operation"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "cumulus_query_duration_seconds", "IVF query duration", &["mode"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cumulus_queries_total", "Query batches executed", &["mode"]
    ).unwrap();
    pub static ref TRAINING_DURATION: Histogram = register_histogram!(
        "cumulus_training_duration_seconds", "k-means training duration",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
    pub static ref INDEX_BUILD_DURATION: Histogram = register_histogram!(
        "cumulus_index_build_duration_seconds", "Index shuffle/persist duration",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
    pub static ref STREAMER_WINDOWS_TOTAL: IntCounter = register_int_counter!(
        "cumulus_streamer_windows_total", "Partition windows loaded by the streamer"
    ).unwrap();
}

pub fn init() {
    lazy_static::initialize(&STORAGE_OP_DURATION);
    lazy_static::initialize(&STORAGE_ERRORS_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&TRAINING_DURATION);
    lazy_static::initialize(&INDEX_BUILD_DURATION);
    lazy_static::initialize(&STREAMER_WINDOWS_TOTAL);
}
