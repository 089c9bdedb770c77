/// Subscription payments: Stripe checkout sessions and crypto invoices
mod client;

pub use client::{PaymentsClient, PollOutcome};
