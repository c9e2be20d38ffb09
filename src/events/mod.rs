pub mod producer;
pub mod types;

pub use producer::{publish_best_effort, EventProducer, ProducerConfig};
pub use types::{
    topics, DomainEvent, EventEnvelope, EventType, FraudMismatchEvent, OrderFinalizedEvent,
    TicketsRepairedEvent,
};
