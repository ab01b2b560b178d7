//! External collaborators
//!
//! The core only needs "did this delivery succeed" and "here are new items". Everything
//! behind those two questions (mail transports, mailbox polling, posting) lives in other
//! programs reached through these seams.

mod command;
mod env;
mod inbox;
mod traits;

pub use command::{CommandSender, CommandSource, ITEM_ENV};
pub use env::{check_process_env, check_required_env};
pub use inbox::{INBOX_ITEM_TYPE, INBOX_ORIGIN, InboxSource};
pub use traits::{Sender, Source};
