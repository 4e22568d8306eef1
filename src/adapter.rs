use crate::event::{Handler, InterfaceState, ReportEvent, ReportSource, Subscribers, SubscriptionId};
use crate::stream::ReportStream;
use crate::{ClientError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Convert<A, B> = Arc<dyn Fn(&A) -> B + Send + Sync>;

/// Wraps a [`ReportSource`] and converts its reports and state on the way out.
///
/// Subscribers see the same timestamps and sensor indices as the upstream,
/// in the same order. Starting the adapter starts the upstream and forwards
/// every upstream report; disposing the adapter disposes the upstream.
pub struct InterfaceAdapter<I, R, S = R>
where
    I: ReportSource,
{
    upstream: I,
    convert_report: Convert<I::Report, R>,
    convert_state: Convert<I::State, S>,
    subscribers: Arc<Subscribers<R>>,
    forwarder: Mutex<Option<SubscriptionId>>,
    disposed: AtomicBool,
    stream_capacity: usize,
}

impl<I, R> InterfaceAdapter<I, R, R>
where
    I: ReportSource,
    I::State: Clone + Into<I::Report>,
    R: Clone + Send + Sync + 'static,
{
    /// Adapter for sources whose state converts into their report type, such
    /// as every built-in kind.
    pub fn new<F>(upstream: I, convert: F) -> Self
    where
        F: Fn(&I::Report) -> R + Send + Sync + 'static,
    {
        let convert: Convert<I::Report, R> = Arc::new(convert);
        let for_state = Arc::clone(&convert);
        Self::build(
            upstream,
            convert,
            Arc::new(move |state: &I::State| for_state(&state.clone().into())),
        )
    }
}

impl<I, R, S> InterfaceAdapter<I, R, S>
where
    I: ReportSource,
    R: Clone + Send + Sync + 'static,
{
    /// Adapter with separate report and state conversions.
    pub fn with_state<F, G>(upstream: I, convert_report: F, convert_state: G) -> Self
    where
        F: Fn(&I::Report) -> R + Send + Sync + 'static,
        G: Fn(&I::State) -> S + Send + Sync + 'static,
    {
        Self::build(upstream, Arc::new(convert_report), Arc::new(convert_state))
    }

    fn build(
        upstream: I,
        convert_report: Convert<I::Report, R>,
        convert_state: Convert<I::State, S>,
    ) -> Self {
        Self {
            upstream,
            convert_report,
            convert_state,
            subscribers: Arc::new(Subscribers::new()),
            forwarder: Mutex::new(None),
            disposed: AtomicBool::new(false),
            stream_capacity: crate::config::DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Capacity of streams created by [`ReportSource::stream`].
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    pub fn upstream(&self) -> &I {
        &self.upstream
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) || self.upstream.is_disposed() {
            return Err(ClientError::UseAfterDispose("InterfaceAdapter"));
        }
        Ok(())
    }
}

impl<I, R, S> ReportSource for InterfaceAdapter<I, R, S>
where
    I: ReportSource,
    R: Clone + Send + Sync + 'static,
    S: 'static,
{
    type Report = R;
    type State = S;

    fn state(&self) -> Result<InterfaceState<S>> {
        self.ensure_live()?;
        let upstream = self.upstream.state()?;
        Ok(InterfaceState {
            timestamp: upstream.timestamp,
            value: (self.convert_state)(&upstream.value),
        })
    }

    fn start(&self) -> Result<()> {
        self.ensure_live()?;

        let mut forwarder = crate::lock(&self.forwarder);
        if forwarder.is_some() {
            return Ok(());
        }

        self.upstream.start()?;

        // The upstream owns the forwarder; holding only a weak reference to
        // our subscribers keeps the two from keeping each other alive.
        let downstream = Arc::downgrade(&self.subscribers);
        let convert = Arc::clone(&self.convert_report);
        let handler: Handler<I::Report> = Arc::new(move |event: &ReportEvent<I::Report>| {
            if let Some(downstream) = downstream.upgrade() {
                downstream.emit(&event.map(|value| convert(value)));
            }
        });
        *forwarder = Some(self.upstream.subscribe_handler(handler)?);
        Ok(())
    }

    fn subscribe_handler(&self, handler: Handler<R>) -> Result<SubscriptionId> {
        self.start()?;
        Ok(self.subscribers.add(handler))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    fn stream(&self) -> Result<ReportStream<R>> {
        self.start()?;
        Ok(ReportStream::attach(&self.subscribers, self.stream_capacity))
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscribers.clear();
        self.upstream.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire) || self.upstream.is_disposed()
    }
}

impl<I, R, S> Drop for InterfaceAdapter<I, R, S>
where
    I: ReportSource,
{
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.subscribers.clear();
            self.upstream.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;
    use crate::mock::{MockCall, MockNative};
    use crate::types::{Quaternion, TimeValue};
    use crate::Context;

    /// Yaw in degrees around +Y.
    fn yaw(q: &Quaternion) -> f64 {
        let siny = 2.0 * (q.w * q.y + q.z * q.x);
        let cosy = 1.0 - 2.0 * (q.x * q.x + q.y * q.y);
        siny.atan2(cosy).to_degrees()
    }

    fn setup() -> (Arc<MockNative>, Context) {
        let mock = Arc::new(MockNative::new());
        let ctx = Context::with_native(mock.clone(), "org.example.test", 0).unwrap();
        (mock, ctx)
    }

    fn quarter_turn() -> Quaternion {
        let half = std::f64::consts::FRAC_PI_4;
        Quaternion {
            w: half.cos(),
            x: 0.0,
            y: half.sin(),
            z: 0.0,
        }
    }

    #[test]
    fn test_adapter_forwards_converted_reports() {
        let (mock, ctx) = setup();
        let head = ctx.interface::<kinds::Orientation>("/me/head").unwrap();
        let heading = InterfaceAdapter::new(head, yaw);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        heading
            .subscribe(move |e| sink.lock().unwrap().push((e.timestamp, e.sensor, e.value.round())))
            .unwrap();

        mock.queue_report::<kinds::Orientation>("/me/head", TimeValue::new(1, 0), 0, Quaternion::default());
        mock.queue_report::<kinds::Orientation>("/me/head", TimeValue::new(2, 0), 0, quarter_turn());
        ctx.update().unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(TimeValue::new(1, 0), 0, 0.0), (TimeValue::new(2, 0), 0, 90.0)]
        );
    }

    #[test]
    fn test_adapter_state_converts_upstream_state() {
        let (mock, ctx) = setup();
        mock.set_state::<kinds::Orientation>("/me/head", TimeValue::new(3, 0), quarter_turn());
        let heading = InterfaceAdapter::new(ctx.interface::<kinds::Orientation>("/me/head").unwrap(), yaw);

        let state = heading.state().unwrap();
        assert_eq!(state.timestamp, TimeValue::new(3, 0));
        assert_eq!(state.value.round(), 90.0);
        assert_eq!(mock.count(|c| matches!(c, MockCall::RegisterCallback(..))), 0);
    }

    #[test]
    fn test_adapter_starts_upstream_once() {
        let (mock, ctx) = setup();
        let analog = ctx.interface::<kinds::Analog>("/a").unwrap();
        let percent = InterfaceAdapter::new(analog, |v: &f64| (v * 100.0) as i32);

        percent.subscribe(|_| {}).unwrap();
        percent.subscribe(|_| {}).unwrap();
        let _stream = percent.stream().unwrap();

        assert_eq!(mock.count(|c| matches!(c, MockCall::RegisterCallback(..))), 1);
        assert_eq!(percent.upstream().subscriber_count(), 1);
    }

    #[test]
    fn test_adapter_dispose_cascades_upstream() {
        let (mock, ctx) = setup();
        let analog = ctx.interface::<kinds::Analog>("/a").unwrap();
        let percent = InterfaceAdapter::with_state(analog, |v: &f64| (v * 100.0) as i32, |v: &f64| *v > 0.5);

        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        percent.subscribe(move |_| *sink.lock().unwrap() += 1).unwrap();

        percent.dispose();
        assert!(percent.is_disposed());
        assert!(percent.upstream().is_disposed());
        assert!(matches!(percent.state(), Err(ClientError::UseAfterDispose(_))));

        mock.fire::<kinds::Analog>("/a", TimeValue::default(), 0, 1.0);
        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(mock.count(|c| matches!(c, MockCall::FreeInterface(_))), 1);
    }

    #[test]
    fn test_adapter_is_dead_once_its_context_is_disposed() {
        let (mock, ctx) = setup();
        mock.set_state::<kinds::Analog>("/a", TimeValue::new(1, 0), 0.9);
        let analog = ctx.interface::<kinds::Analog>("/a").unwrap();
        let pressed = InterfaceAdapter::with_state(analog, |v: &f64| *v > 0.5, |v: &f64| format!("{:.1}", v));
        assert_eq!(pressed.state().unwrap().value, "0.9");

        ctx.dispose();
        assert!(matches!(pressed.state(), Err(ClientError::UseAfterDispose("InterfaceAdapter"))));
        assert!(matches!(pressed.start(), Err(ClientError::UseAfterDispose("InterfaceAdapter"))));
        assert!(pressed.stream().is_err());
    }

    #[test]
    fn test_adapter_of_adapter() {
        let (mock, ctx) = setup();
        let analog = ctx.interface::<kinds::Analog>("/a").unwrap();
        let percent = InterfaceAdapter::new(analog, |v: &f64| (v * 100.0) as i32);
        let pressed = InterfaceAdapter::with_state(percent, |p: &i32| *p >= 50, |p: &i32| *p >= 50);
        let stream = pressed.stream().unwrap();

        mock.queue_report::<kinds::Analog>("/a", TimeValue::default(), 0, 0.2);
        mock.queue_report::<kinds::Analog>("/a", TimeValue::default(), 0, 0.8);
        ctx.update().unwrap();

        let values: Vec<bool> = stream.drain().into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![false, true]);
    }
}
