//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod user;
pub mod event;
pub mod registration;

// Re-export commonly used models
pub use user::{User, UserRole, CreateUserRequest, Requester};
pub use event::{Event, EventCategory, EventStatus, CreateEventRequest, UpdateEventRequest, RegistrationStats, derive_status};
pub use registration::{
    Registration, RegistrationStatus, CheckInMethod, PaymentStatus, PaymentMethod, PaymentDetails,
    PaymentRequest, AcceptedPayment, NewRegistration, Ticket,
};
