use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use wavemesh_crypto::envelope::{decrypt, encrypt};
use wavemesh_crypto::{CipherKey, Xtea};

fn bench_block(c: &mut Criterion) {
    let cipher = Xtea::new(&[0x42; 16]);
    c.bench_function("xtea/encrypt_block", |b| {
        let mut block = [0x13u8; 8];
        b.iter(|| cipher.encrypt_block(&mut block));
    });
    c.bench_function("xtea/decrypt_block", |b| {
        let mut block = [0x13u8; 8];
        b.iter(|| cipher.decrypt_block(&mut block));
    });
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let key = CipherKey::new([0x42; 16]);

    for len in [8usize, 16, 32, 64] {
        let payload = vec![0xABu8; len];
        let ciphertext = encrypt(&key, &payload);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", len), &payload, |b, p| {
            b.iter(|| encrypt(&key, p));
        });
        group.bench_with_input(BenchmarkId::new("decrypt", len), &ciphertext, |b, c| {
            b.iter(|| decrypt(&key, c));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_block, bench_envelope);
criterion_main!(benches);
