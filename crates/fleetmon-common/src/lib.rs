pub mod backoff;
pub mod convert;
pub mod logging;
pub mod types;

pub mod proto {
    pub mod metric {
        #![allow(clippy::pedantic)]
        #![allow(clippy::missing_errors_doc)]
        #![allow(clippy::doc_markdown)]
        #![allow(clippy::default_trait_access)]
        tonic::include_proto!("fleetmon.metric");
    }

    pub mod health {
        #![allow(clippy::pedantic)]
        #![allow(clippy::doc_markdown)]
        tonic::include_proto!("fleetmon.health");
    }
}

/// Milliseconds since the Unix epoch for a protobuf timestamp.
pub fn timestamp_millis(ts: &prost_types::Timestamp) -> i64 {
    ts.seconds * 1000 + i64::from(ts.nanos) / 1_000_000
}
