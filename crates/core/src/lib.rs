pub mod capture {
    pub mod domain {
        pub mod capture_device;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod emotion {
    pub mod domain {
        pub mod emotion;
        pub mod emotion_classifier;
    }
    pub mod infrastructure;
}

pub mod tracking {
    pub mod domain {
        pub mod face_observation;
        pub mod face_tracker;
    }
}

pub mod rendering {
    pub mod domain {
        pub mod frame_annotator;
    }
    pub mod infrastructure;
}

pub mod persistence {
    pub mod domain {
        pub mod session_store;
        pub mod store_ledger;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod capture_worker;
    pub mod emotion_summary;
    pub mod frame_queue;
    pub mod pipeline_logger;
    pub mod processing_worker;
    pub mod session_aggregator;
    pub mod session_controller;
    pub mod snapshot;
    pub mod worker;
}

pub mod streaming {
    pub mod frame_stream;
    pub mod multipart;
}

pub mod shared {
    pub mod bounding_box;
    pub mod cancellation;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod onnx_session;
}
