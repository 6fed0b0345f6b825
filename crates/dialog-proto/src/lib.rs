//! Generated gRPC contracts.
//!
//! The `.proto` sources live under `proto/` and are compiled by
//! `tonic-build`; this crate only re-exports the generated modules.

pub mod dialog {
    pub mod v1 {
        tonic::include_proto!("dialog.v1");
    }
}

pub mod llm {
    pub mod v1 {
        tonic::include_proto!("llm.v1");
    }
}
