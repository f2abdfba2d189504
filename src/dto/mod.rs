pub mod application_dto;
pub mod session_dto;
