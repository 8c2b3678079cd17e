pub mod bluetooth;
pub mod bridge;
pub mod logging;
pub mod stub;
