pub mod matching_service;
pub mod notification_service;
pub mod pipeline_service;
pub mod session_service;
