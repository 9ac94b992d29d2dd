//! Mensajes y embeds visibles en Discord.

pub mod embeds;
pub mod notifications;
