//! Marshalling benchmarks
//!
//! Measures scalar and container conversions and trampoline dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use typthon_marshal::{
    scan_for_callback_slots, ArgInfo, Argument, CallableInfo, Direction, ExecutionContext, HostCallable,
    HostValue, InterfaceInfo, MarshalConfig, Marshaller, ObjectModel, Repository, ScopeType, Transfer,
    TrampolineManager, TypeInfo, TypeSystem, TypeTag,
};

fn marshaller() -> Arc<Marshaller> {
    let types = Arc::new(TypeSystem::new());
    let model = Arc::new(ObjectModel::new(types.clone()));
    Arc::new(Marshaller::new(types, model, MarshalConfig::default()))
}

fn bench_scalars(c: &mut Criterion) {
    let m = marshaller();
    let mut group = c.benchmark_group("scalar_round_trip");

    for tag in [TypeTag::Int32, TypeTag::UInt64, TypeTag::Double] {
        let info = TypeInfo::new(tag);
        let value = HostValue::Int(42);
        group.bench_with_input(BenchmarkId::from_parameter(tag.name()), &info, |b, info| {
            b.iter(|| {
                m.check_value(info, &value).unwrap();
                let arg = m.to_native(black_box(&value), info, Transfer::Nothing).unwrap();
                unsafe { m.to_host(arg, info, Transfer::Nothing) }.unwrap()
            })
        });
    }

    group.finish();
}

fn bench_arrays(c: &mut Criterion) {
    let m = marshaller();
    let mut group = c.benchmark_group("string_array");

    for size in [8usize, 64, 512] {
        let info = TypeInfo::array(TypeInfo::new(TypeTag::Utf8));
        let value = HostValue::List((0..size).map(|i| HostValue::str(format!("item{}", i))).collect());

        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| {
                let arg = m.to_native(black_box(value), &info, Transfer::Nothing).unwrap();
                let back = unsafe { m.to_host(arg, &info, Transfer::Nothing) }.unwrap();
                unsafe { m.release(arg, &info, Transfer::Nothing, Direction::In) };
                back
            })
        });
    }

    group.finish();
}

fn bench_trampoline(c: &mut Criterion) {
    let manager = TrampolineManager::new(marshaller(), Arc::new(Repository::new()), ExecutionContext::new());

    let signature = CallableInfo::builder("Bench", "Add")
        .arg(ArgInfo::new("a", TypeInfo::new(TypeTag::Int32)))
        .arg(ArgInfo::new("b", TypeInfo::new(TypeTag::Int32)))
        .returns(TypeInfo::new(TypeTag::Int32), Transfer::Nothing)
        .build();
    let function = CallableInfo::builder("Bench", "apply")
        .arg(
            ArgInfo::new("func", TypeInfo::interface(InterfaceInfo::callback(signature)))
                .with_scope(ScopeType::Notified),
        )
        .build();
    let slots = scan_for_callback_slots(&function).unwrap();
    let add = HostCallable::new("add", |args: &[HostValue]| {
        Ok(HostValue::Float(args[0].to_f64()? + args[1].to_f64()?))
    });
    let handle = manager
        .create_trampoline(&function, &slots, &[HostValue::Callable(add)])
        .unwrap();

    c.bench_function("trampoline_invoke", |b| {
        b.iter(|| unsafe {
            manager
                .invoke(handle.id(), black_box(&[Argument::Int32(2), Argument::Int32(40)]))
                .unwrap()
        })
    });

    manager.notify(handle.user_data_token());
}

criterion_group!(benches, bench_scalars, bench_arrays, bench_trampoline);
criterion_main!(benches);
