use criterion::{criterion_group, criterion_main, Criterion};
use shrimp::{State, Value};

fn bench_allocation(c: &mut Criterion) {
    c.bench_function("cons_1000_then_collect", |b| {
        let mut st = State::new();
        b.iter(|| {
            let ai = st.enter();
            let mut head = Value::Nil;
            for i in 0..1000 {
                head = st.cons(Value::Int(i), head);
            }
            st.leave(ai);
            st.collect();
            head
        });
    });
}

fn bench_collection(c: &mut Criterion) {
    c.bench_function("collect_retained_10k", |b| {
        let mut st = State::new();
        let _ai = st.enter();
        let mut head = Value::Nil;
        for i in 0..10_000 {
            head = st.cons(Value::Int(i), head);
        }
        b.iter(|| st.collect());
    });

    c.bench_function("collect_weak_map_1k", |b| {
        let mut st = State::new();
        let _ai = st.enter();
        let w = st.make_weak();
        for i in 0..1000 {
            let k = st.cons(Value::Int(i), Value::Nil);
            st.weak_set(w, k, Value::Int(i));
        }
        b.iter(|| st.collect());
    });
}

fn bench_intern(c: &mut Criterion) {
    c.bench_function("intern_hit", |b| {
        let mut st = State::new();
        let _ai = st.enter();
        st.intern("lambda");
        b.iter(|| st.intern("lambda"));
    });
}

criterion_group!(benches, bench_allocation, bench_collection, bench_intern);
criterion_main!(benches);
