use std::sync::Arc;

use common::Money;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{LogOtpSender, OrderLine, OrderWorkflow, OtpStore, RfidRegistry};
use notify::BroadcastNotifier;
use store::{Balance, CanteenStore, InMemoryStore, MenuItem, Student};

struct Bench {
    workflow: OrderWorkflow<InMemoryStore>,
    student: Student,
    items: Vec<MenuItem>,
}

async fn seeded(item_count: usize) -> Bench {
    let store = InMemoryStore::new();
    let student = Student::new("Bench", "bench@example.com");
    store.insert_student(&student).await.unwrap();
    store
        .insert_balance(&Balance::new(student.id, Money::from_cents(i64::MAX / 2)))
        .await
        .unwrap();

    let mut items = Vec::with_capacity(item_count);
    for i in 0..item_count {
        let item = MenuItem::new(format!("Item {i}"), Money::from_cents(125), i32::MAX);
        store.insert_menu_item(&item).await.unwrap();
        items.push(item);
    }

    let registry = RfidRegistry::new(
        store.clone(),
        Arc::new(OtpStore::default()),
        Arc::new(LogOtpSender),
    );
    let workflow = OrderWorkflow::new(
        store,
        Arc::new(BroadcastNotifier::new()),
        Arc::new(registry),
    );

    Bench {
        workflow,
        student,
        items,
    }
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bench = rt.block_on(seeded(1));

    c.bench_function("domain/create_order_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                bench
                    .workflow
                    .create_order(bench.student.id, vec![OrderLine::new(bench.items[0].id, 1)])
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_create_order_many_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bench = rt.block_on(seeded(10));
    let lines: Vec<OrderLine> = bench
        .items
        .iter()
        .map(|item| OrderLine::new(item.id, 2))
        .collect();

    c.bench_function("domain/create_order_ten_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                bench
                    .workflow
                    .create_order(bench.student.id, lines.clone())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_dispatch_and_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bench = rt.block_on(seeded(1));

    c.bench_function("domain/create_dispatch_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = bench
                    .workflow
                    .create_order(bench.student.id, vec![OrderLine::new(bench.items[0].id, 1)])
                    .await
                    .unwrap()
                    .order;
                bench.workflow.dispatch(order.id).await.unwrap();
                bench
                    .workflow
                    .confirm_collection(order.id, bench.student.id)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_order,
    bench_create_order_many_lines,
    bench_dispatch_and_confirm
);
criterion_main!(benches);
