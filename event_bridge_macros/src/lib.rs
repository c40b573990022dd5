mod domain_event;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(DomainEvent)] derive macro
// ============================================================================

/// Derive macro for the `DomainEvent` and `EventType` traits.
///
/// # Usage
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, DomainEvent)]
/// struct OrderPlaced {
///     order_id: String,
///     amount: u64,
/// }
///
/// #[derive(Debug, Clone, Serialize, DomainEvent)]
/// #[event(name = "orders.cancelled")]
/// struct OrderCancelled {
///     order_id: String,
/// }
/// ```
///
/// - The topic is the struct identifier unless `#[event(name = "...")]`
///   overrides it.
/// - Field declaration order becomes `EventType::FIELDS`; an inbound
///   payload's values are assigned to the fields in wire order, whatever
///   keys they were sent under.
/// - The struct must implement `serde::Serialize` (payload encoding) and
///   every field type must implement `serde::de::DeserializeOwned`.
/// - Unit structs are accepted and travel as `{}`. Tuple structs are
///   rejected: their payload would have no field names.
#[proc_macro_derive(DomainEvent, attributes(event))]
pub fn derive_domain_event(input: TokenStream) -> TokenStream {
    domain_event::derive_domain_event(input)
}
