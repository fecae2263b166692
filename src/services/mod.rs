pub mod entitlement_service;
pub mod grading_service;
pub mod session_service;
pub mod session_timer;
pub mod window_service;
