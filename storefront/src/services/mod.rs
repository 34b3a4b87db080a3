// kloven_storefront/src/services/mod.rs

//! External collaborators (database, payment provider, email provider) behind
//! traits, plus the pure pricing and cart logic.

pub mod cart;
pub mod email;
pub mod payment_gateway;
pub mod pricing;
pub mod store;

pub use email::{Mailer, OutgoingEmail, ResendMailer};
pub use payment_gateway::{MercadoPagoClient, PaymentGateway};
pub use store::{OrderStore, PaymentStatusUpdate, PgOrderStore, RecordOutcome};
