// Generated by build.rs via tonic-build

pub mod common {
    include!("lostfound.common.rs");
}

pub mod items {
    include!("lostfound.items.rs");
}

pub mod health {
    include!("grpc.health.v1.rs");
}
