pub mod face_match;
pub mod roles;
pub mod storage;
pub mod verification_service;
