use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::TenantId;

/// Envelope for a published event, carrying tenant metadata.
///
/// `event_id` is a UUIDv7, so envelopes sort by publication time. Consumers
/// use it to drop redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(tenant_id: TenantId, payload: E) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
