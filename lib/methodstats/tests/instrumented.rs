use std::panic::{self, AssertUnwindSafe};

use methodstats::method_stats;
use methodstats_metrics::test::TestRecorder;

struct OrderService;

impl OrderService {
    #[method_stats(tags = "region,us-east")]
    fn place(&self, #[tag("order.id")] id: u64) -> Result<u64, String> {
        if id == 0 {
            return Err("empty order".to_string());
        }
        Ok(id * 10)
    }

    #[method_stats(action = "READ", latency = false)]
    fn lookup(&self, #[tag("sku")] sku: &str, quantity: usize) -> usize {
        sku.len() * quantity
    }

    #[method_stats(name = "orders.cancel")]
    async fn cancel(&self, #[tag("order.id")] id: u64, #[tag("user")] user: &str) -> Result<(), String> {
        if user.is_empty() {
            return Err(format!("order {} has no owner", id));
        }
        Ok(())
    }
}

#[method_stats(declaring_type = "Checkout")]
fn total(items: &[u32]) -> u32 {
    items.iter().sum()
}

#[method_stats]
fn explode(#[tag("reason")] reason: &str) -> u32 {
    panic!("{}", reason)
}

fn recorded<F: FnOnce()>(f: F) -> TestRecorder {
    let recorder = TestRecorder::default();
    metrics::with_local_recorder(&recorder, f);
    recorder
}

#[test]
fn successful_call() {
    let recorder = recorded(|| {
        assert_eq!(OrderService.place(42), Ok(420));
    });

    assert_eq!(
        recorder.counter("methodstats_count!method.name=orderservice_place!method.outcome=SUCCESS!order.id=42!region=us-east"),
        Some(1)
    );
    assert!(recorder
        .gauge("methodstats_gauge!method.name=orderservice_place!order.id=42!region=us-east")
        .is_some());
    assert_eq!(
        recorder
            .histogram("methodstats_timer!method.name=orderservice_place!order.id=42!region=us-east")
            .map(|samples| samples.len()),
        Some(1)
    );
}

#[test]
fn failed_call() {
    let recorder = recorded(|| {
        assert_eq!(OrderService.place(0), Err("empty order".to_string()));
    });

    assert_eq!(
        recorder.counter_names(),
        vec!["methodstats_count!method.name=orderservice_place!method.outcome=ERROR!order.id=0!region=us-east".to_string()]
    );
    assert!(recorder.gauge_names().is_empty());
    assert!(recorder.histogram_names().is_empty());
}

#[test]
fn repeated_calls_share_one_counter() {
    let recorder = recorded(|| {
        for _ in 0..3 {
            assert_eq!(OrderService.lookup("ab-1", 2), 8);
        }
        assert_eq!(OrderService.lookup("cd-2", 1), 4);
    });

    assert_eq!(
        recorder.counter("methodstats_count!method.action=READ!method.name=orderservice_lookup!method.outcome=SUCCESS!sku=ab-1"),
        Some(3)
    );
    assert_eq!(
        recorder.counter("methodstats_count!method.action=READ!method.name=orderservice_lookup!method.outcome=SUCCESS!sku=cd-2"),
        Some(1)
    );
    assert!(recorder.gauge_names().is_empty());
}

#[test]
fn async_call() {
    let recorder = recorded(|| {
        assert_eq!(tokio_test::block_on(OrderService.cancel(7, "jane doe")), Ok(()));
        assert!(tokio_test::block_on(OrderService.cancel(8, "")).is_err());
    });

    assert_eq!(
        recorder.counter(
            "methodstats_count!method.name=orders_cancel!method.outcome=SUCCESS!order.id=7!user=jane\\ doe"
        ),
        Some(1)
    );
    assert_eq!(
        recorder.counter("methodstats_count!method.name=orders_cancel!method.outcome=ERROR!order.id=8"),
        Some(1)
    );
    assert_eq!(
        recorder.histogram_names(),
        vec!["methodstats_timer!method.name=orders_cancel!order.id=7!user=jane\\ doe".to_string()]
    );
}

#[test]
fn explicit_declaring_type() {
    let recorder = recorded(|| {
        assert_eq!(total(&[1, 2, 3]), 6);
    });

    assert_eq!(
        recorder.counter("methodstats_count!method.name=checkout_total!method.outcome=SUCCESS"),
        Some(1)
    );
}

#[test]
fn panicking_call() {
    let recorder = recorded(|| {
        let result = panic::catch_unwind(AssertUnwindSafe(|| explode("boom")));
        assert!(result.is_err());
    });

    assert_eq!(
        recorder.counter_names(),
        vec!["methodstats_count!method.name=instrumented_explode!method.outcome=ERROR!reason=boom".to_string()]
    );
    assert!(recorder.histogram_names().is_empty());
}
