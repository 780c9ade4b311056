// Copyright (c) 2021, KTH Royal Institute of Technology.
// SPDX-License-Identifier: AGPL-3.0-only

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use operon::{conf::logger::discard_logger, prelude::*};
use std::sync::Arc;

const BATCH: i64 = 1000;

fn schema() -> SchemaRef {
    Schema::shared(vec![
        ("id", AttributeType::Int64),
        ("payload", AttributeType::RString),
    ])
    .unwrap()
}

fn pass_through_kernel() -> OperatorKernel<impl Operator> {
    let model = OperatorModel::for_pattern(OperatorPattern::Process, "Bench", "bench");
    let binding = PortBinding::new()
        .input("In", schema())
        .output_to("Out", schema(), Arc::new(Mute));
    OperatorKernel::with_logger(
        model,
        binding,
        Transform::pass_through(),
        OperonConf::default(),
        discard_logger(),
    )
    .unwrap()
}

fn operon_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("operon_dispatch");
    group.bench_function("kernel process", kernel_process);
    group.bench_function("dispatcher batch", dispatcher_batch);
    group.finish()
}

fn kernel_process(b: &mut Bencher) {
    let kernel = pass_through_kernel();
    kernel.initialize(ContextInfo::default()).unwrap();
    kernel.all_ports_ready().unwrap();
    let tuple = Tuple::new(schema(), vec![Value::Int64(1), Value::from("payload")]).unwrap();

    b.iter(|| black_box(kernel.process(0, tuple.clone())));
    kernel.shutdown().unwrap();
}

fn dispatcher_batch(b: &mut Bencher) {
    let tuples: Vec<Tuple> = (0..BATCH)
        .map(|i| Tuple::new(schema(), vec![Value::Int64(i), Value::from("payload")]).unwrap())
        .collect();

    b.iter(|| {
        let dispatcher =
            Dispatcher::launch(Arc::new(pass_through_kernel()), ContextInfo::default()).unwrap();
        let sender = dispatcher.sender(0).unwrap();
        for tuple in &tuples {
            sender.send_tuple(tuple.clone()).unwrap();
        }
        sender.send_punctuation(Punctuation::FinalMarker).unwrap();
        dispatcher.join().unwrap();
        dispatcher.shutdown().unwrap();
    });
}

criterion_group!(benches, operon_dispatch);
criterion_main!(benches);
