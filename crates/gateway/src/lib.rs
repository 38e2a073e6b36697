//! Chat-platform interface for the verification workflow.
//!
//! - **Transport** (`socket`) - envelope stream with acknowledgement and reconnect backoff
//! - **Events** (`events`) - typed envelopes routed to handlers by event type
//! - **Slash commands** (`commands`) - `/verify email`, `/verify code`, `/verify help`
//! - **Landing surface** (`landing`) - landing message buttons, modal prompts, moderation
//! - **Prompts** (`prompts`) - one-shot prompts bound to the member that opened them
//! - **Cooldown** (`cooldown`) - per command and member rate limit
//! - **Blocks** (`blocks`) - message and modal builders
//!
//! ```text
//! Envelope → GatewayRunner → EventDispatcher → Handlers → VerificationService
//!                 ↓
//!          ChatSurface / respond ← MessageTemplate
//! ```

pub mod blocks;
pub mod commands;
pub mod cooldown;
pub mod events;
pub mod landing;
pub mod prompts;
pub mod socket;
pub mod surface;
