/// Identity of a peer, assigned during rendezvous. Always in `0..PEERS`.
pub type PeerId = usize;

/// Payload agreed upon by the peers. The consensus engine only moves
/// commands around; it never looks inside them.
pub trait Command: Send
    + Sync
    + Clone
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + 'static
{
}

impl<T> Command for T where T: Send
    + Sync
    + Clone
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + 'static
{
}
