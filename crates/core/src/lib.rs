//! Multi-camera surveillance core: per-camera stream workers, person
//! detection, face matching against a refreshed identity registry and
//! cooldown-gated alerting.

pub mod shared {
    pub mod backend_client;
    pub mod bounding_box;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod source_error;
}

pub mod video {
    pub mod domain {
        pub mod frame_sample;
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod detection_candidate;
        pub mod face_locator;
        pub mod person_detector;
    }
    pub mod infrastructure;
}

pub mod recognition {
    pub mod domain {
        pub mod embedding;
        pub mod face_embedder;
        pub mod identity;
        pub mod match_result;
        pub mod registry_snapshot;
        pub mod registry_source;
    }
    pub mod face_registry;
    pub mod identity_matcher;
    pub mod infrastructure;
}

pub mod alerting {
    pub mod domain {
        pub mod alert_event;
        pub mod alert_sink;
    }
    pub mod alert_dispatcher;
    pub mod infrastructure;
}

pub mod fleet {
    pub mod domain {
        pub mod camera;
        pub mod fleet_source;
        pub mod worker_state;
    }
    pub mod camera_stream_worker;
    pub mod fleet_manager;
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod frame_pipeline;
    pub mod pipeline_logger;
}

pub mod supervisor;

#[cfg(test)]
mod test_support;
