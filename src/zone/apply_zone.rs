// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async zone preservation.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use super::zone_impl::{Activation, Zone};

/// A [`Future`] wrapper that makes a zone current while its inner future is polled.
///
/// Executors poll futures from wherever they like, so the thread-local current
/// zone at poll time is usually unrelated to the zone that created the future.
/// `ApplyZone` activates its zone around each poll, with the same `before_task`
/// and `after_task` notifications as [`Zone::run`], and restores the prior zone
/// afterwards.
///
/// # Examples
///
/// ```rust
/// use zonewise::zone::{ApplyZone, Zone, ZoneSpec};
/// use serde_json::json;
///
/// async fn which_request() -> Option<serde_json::Value> {
///     Zone::current().data("request").cloned()
/// }
///
/// # async fn example() {
/// let zone = Zone::current().fork(ZoneSpec::new().data("request", json!(17)));
/// let seen = ApplyZone::new(zone, which_request()).await;
/// assert_eq!(seen, Some(json!(17)));
/// # }
/// ```
pub struct ApplyZone<F>(Zone, F);

impl<F> ApplyZone<F> {
    pub fn new(zone: Zone, f: F) -> Self {
        Self(zone, f)
    }

    pub fn zone(&self) -> &Zone {
        &self.0
    }
}

impl<F> Future for ApplyZone<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        //safety: the inner future is never moved out of `self`
        let (zone, fut) = unsafe {
            let d = self.get_unchecked_mut();
            (d.0.clone(), Pin::new_unchecked(&mut d.1))
        };
        let _activation = Activation::begin(&zone);
        fut.poll(cx)
    }
}
