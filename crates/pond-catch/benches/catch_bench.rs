use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pond_catch::{generate_catch, RarityTable};
use pond_core::Catalog;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn bench_catch(c: &mut Criterion) {
    let catalog = Catalog::standard().unwrap();
    let table = RarityTable::standard();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    c.bench_function("generate_catch", |b| {
        b.iter(|| {
            let _ = generate_catch(black_box(&table), &catalog, &mut rng);
        })
    });
    c.bench_function("rarity_draw", |b| b.iter(|| table.draw(&mut rng)));
}

criterion_group!(benches, bench_catch);
criterion_main!(benches);
