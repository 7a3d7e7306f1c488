//! Chimera core library: Telegram channel, answer producer client, event emitter, and the
//! per-message session coordinator, wired together by the gateway.

pub mod channels;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod typing;

#[cfg(test)]
mod testing;
