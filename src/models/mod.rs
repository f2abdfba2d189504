pub mod answer;
pub mod application;
pub mod assessment_session;
pub mod candidate;
pub mod question;
pub mod stage_event;
pub mod vacancy;
