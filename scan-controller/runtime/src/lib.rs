#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use scan_controller_core as core;
pub use scan_controller_dispatch as dispatch;
pub use scan_controller_k8s_api as k8s;
pub use scan_controller_k8s_watch as watch;

mod args;

pub use self::args::Args;
