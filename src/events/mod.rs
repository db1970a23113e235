//! # Gateway Events
//!
//! Handlers for named platform events (as opposed to interactions).
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

pub mod ready;

use anyhow::Result;
use log::info;
use serenity::async_trait;
use std::sync::Arc;

use crate::dispatcher::HandlerContext;
use crate::platform::InboundEvent;
use crate::registry::{Handler, HandlerKind};

pub const READY: &str = "ready";
pub const RESUME: &str = "resume";

pub fn create_event_handlers() -> Vec<Arc<dyn Handler>> {
    vec![Arc::new(ready::ReadyEvent), Arc::new(ResumeEvent)]
}

pub struct ResumeEvent;

#[async_trait]
impl Handler for ResumeEvent {
    fn key(&self) -> &str {
        RESUME
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Event
    }

    async fn invoke(&self, _ctx: &HandlerContext, _event: &InboundEvent) -> Result<()> {
        info!("🔄 Gateway session resumed");
        Ok(())
    }
}
