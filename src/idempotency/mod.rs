pub mod guard;
pub mod ticket_code;

pub use guard::{IdempotencyGuard, Resolution};
pub use ticket_code::{EntropySource, OsEntropy, TicketCodeConfig, TicketCodeGenerator};
