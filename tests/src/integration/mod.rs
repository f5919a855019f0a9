//! # Integration Scenarios
//!
//! Every participant gets its own key store and keyring; all of them share
//! one `InMemoryNetwork`, so a publish by one is seen by the others exactly
//! as on a real pub/sub network.

#[cfg(test)]
mod chat_flow;
#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod item_flow;
#[cfg(test)]
mod properties;
