//! Subscription manager
//!
//! Issues data requests for registered definitions and remembers them, so
//! polled subscriptions can be re-issued on every request tick. Both delivery
//! models go through [`SubscriptionManager::subscribe`]; the mode only
//! decides which transport call is made and whether it repeats.

use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::transport::Transport;
use crate::types::{
    DefinitionId, DeliveryMode, ObjectId, Period, RequestFlags, RequestId, SimObjectType,
    Subscription,
};

#[derive(Debug, Default, Clone)]
pub struct SubscriptionManager {
    subscriptions: BTreeMap<RequestId, Subscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the first request for a subscription and record it.
    pub async fn subscribe<T: Transport>(
        &mut self,
        transport: &mut T,
        request: RequestId,
        definition: DefinitionId,
        target: ObjectId,
        delivery: DeliveryMode,
    ) -> Result<Subscription> {
        let subscription = Subscription { request, definition, target, delivery };
        issue(transport, &subscription).await?;

        debug!(%request, %definition, %target, ?delivery, "Subscription issued");
        self.subscriptions.insert(request, subscription.clone());
        Ok(subscription)
    }

    /// Single delivery; the caller re-issues for the next sample.
    pub async fn request_once<T: Transport>(
        &mut self,
        transport: &mut T,
        request: RequestId,
        definition: DefinitionId,
        target: ObjectId,
        radius_meters: u32,
    ) -> Result<Subscription> {
        self.subscribe(transport, request, definition, target, DeliveryMode::Once { radius_meters })
            .await
    }

    /// Continuous push every `period` until the connection closes.
    pub async fn request_continuous<T: Transport>(
        &mut self,
        transport: &mut T,
        request: RequestId,
        definition: DefinitionId,
        target: ObjectId,
        period: Period,
    ) -> Result<Subscription> {
        let delivery = DeliveryMode::Continuous { period, flags: RequestFlags::default() };
        self.subscribe(transport, request, definition, target, delivery).await
    }

    /// Re-issue every polled subscription. Returns how many were sent.
    ///
    /// A refused re-issue is logged and skipped; the rest still go out and
    /// the subscription is tried again on the next tick. Only fatal errors
    /// are returned.
    pub async fn poll_due<T: Transport>(&self, transport: &mut T) -> Result<usize> {
        let mut issued = 0;
        for subscription in self.subscriptions.values().filter(|s| s.delivery.needs_polling()) {
            match issue(transport, subscription).await {
                Ok(()) => issued += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(request = %subscription.request, error = %e, "Poll request refused");
                }
            }
        }
        if issued > 0 {
            trace!(issued, "Re-issued polled subscriptions");
        }
        Ok(issued)
    }

    pub fn get(&self, request: RequestId) -> Option<&Subscription> {
        self.subscriptions.get(&request)
    }

    /// Subscriptions bound to `definition`, in request order.
    pub fn for_definition(&self, definition: DefinitionId) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values().filter(move |s| s.definition == definition)
    }

    pub fn has_polled(&self) -> bool {
        self.subscriptions.values().any(|s| s.delivery.needs_polling())
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

/// Send the transport call a subscription's delivery mode requires.
async fn issue<T: Transport>(transport: &mut T, subscription: &Subscription) -> Result<()> {
    let Subscription { request, definition, target, delivery } = *subscription;

    match delivery {
        DeliveryMode::Poll { radius_meters } | DeliveryMode::Once { radius_meters } => {
            if target == ObjectId::USER {
                transport
                    .request_data_on_sim_object_type(
                        request,
                        definition,
                        radius_meters,
                        SimObjectType::User,
                    )
                    .await
            } else {
                transport
                    .request_data_on_sim_object(
                        request,
                        definition,
                        target,
                        Period::Once,
                        RequestFlags::default(),
                    )
                    .await
            }
        }
        DeliveryMode::Continuous { period, flags } => {
            transport.request_data_on_sim_object(request, definition, target, period, flags).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::{ScriptedTransport, TransportCall};

    #[tokio::test]
    async fn continuous_requests_target_the_object_with_period() {
        let (mut transport, handle) = ScriptedTransport::new();
        let mut manager = SubscriptionManager::new();

        manager
            .request_continuous(
                &mut transport,
                RequestId::new(1),
                DefinitionId::new(1),
                ObjectId::USER,
                Period::VisualFrame,
            )
            .await
            .unwrap();

        assert_eq!(
            handle.calls(),
            vec![TransportCall::RequestDataOnSimObject {
                request: RequestId::new(1),
                definition: DefinitionId::new(1),
                object: ObjectId::USER,
                period: Period::VisualFrame,
                flags: RequestFlags::default(),
            }]
        );
        assert!(!manager.has_polled());
    }

    #[tokio::test]
    async fn once_requests_for_user_go_by_type() {
        let (mut transport, handle) = ScriptedTransport::new();
        let mut manager = SubscriptionManager::new();

        manager
            .request_once(
                &mut transport,
                RequestId::new(2),
                DefinitionId::new(3),
                ObjectId::USER,
                0,
            )
            .await
            .unwrap();

        assert_eq!(
            handle.calls(),
            vec![TransportCall::RequestDataOnSimObjectType {
                request: RequestId::new(2),
                definition: DefinitionId::new(3),
                radius_meters: 0,
                object_type: SimObjectType::User,
            }]
        );

        // once is never re-issued
        assert_eq!(manager.poll_due(&mut transport).await.unwrap(), 0);
        assert_eq!(handle.calls().len(), 1);
    }

    #[tokio::test]
    async fn polled_subscriptions_reissue_with_same_request() {
        let (mut transport, handle) = ScriptedTransport::new();
        let mut manager = SubscriptionManager::new();

        manager
            .subscribe(
                &mut transport,
                RequestId::new(7),
                DefinitionId::new(1),
                ObjectId::USER,
                DeliveryMode::Poll { radius_meters: 0 },
            )
            .await
            .unwrap();
        manager
            .request_continuous(
                &mut transport,
                RequestId::new(8),
                DefinitionId::new(2),
                ObjectId::USER,
                Period::Second,
            )
            .await
            .unwrap();

        assert_eq!(manager.poll_due(&mut transport).await.unwrap(), 1);
        assert_eq!(manager.poll_due(&mut transport).await.unwrap(), 1);

        let by_type = handle
            .calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    TransportCall::RequestDataOnSimObjectType { request, .. }
                        if *request == RequestId::new(7)
                )
            })
            .count();
        assert_eq!(by_type, 3);
        assert_eq!(manager.for_definition(DefinitionId::new(2)).count(), 1);
    }

    #[tokio::test]
    async fn refused_poll_does_not_skip_the_others() {
        let (mut transport, handle) = ScriptedTransport::new();
        let mut manager = SubscriptionManager::new();
        for raw in 1..=2 {
            manager
                .subscribe(
                    &mut transport,
                    RequestId::new(raw),
                    DefinitionId::new(raw),
                    ObjectId::USER,
                    DeliveryMode::Poll { radius_meters: 0 },
                )
                .await
                .unwrap();
        }

        handle.fail_next_call(-1);
        assert_eq!(manager.poll_due(&mut transport).await.unwrap(), 1);
        assert_eq!(manager.poll_due(&mut transport).await.unwrap(), 2);

        let reissued: Vec<RequestId> = handle
            .calls()
            .into_iter()
            .skip(2)
            .filter_map(|call| match call {
                TransportCall::RequestDataOnSimObjectType { request, .. } => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(reissued, vec![RequestId::new(2), RequestId::new(1), RequestId::new(2)]);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn failed_issue_is_not_recorded() {
        let (mut transport, handle) = ScriptedTransport::new();
        handle.fail_next_call(-1);
        let mut manager = SubscriptionManager::new();

        let result = manager
            .request_continuous(
                &mut transport,
                RequestId::new(1),
                DefinitionId::new(1),
                ObjectId::USER,
                Period::VisualFrame,
            )
            .await;

        assert!(result.is_err());
        assert!(manager.is_empty());
    }
}
