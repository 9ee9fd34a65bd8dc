use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

/// Words per hypervector in the engine's exports (157 × 64 = 10048 bits).
const WORDS: usize = 157;
/// Probability of flipping each bit of a cluster prototype.
const NOISE: f64 = 0.08;

fn random_vector(rng: &mut ChaCha8Rng) -> Vec<u64> {
    (0..WORDS).map(|_| rng.gen::<u64>()).collect()
}

/// Copy of `base` with each bit flipped independently with probability `p`.
fn perturb(base: &[u64], p: f64, rng: &mut ChaCha8Rng) -> Vec<u64> {
    base.iter()
        .map(|&word| {
            let mut mask = 0u64;
            for b in 0..64 {
                if rng.gen_bool(p) {
                    mask |= 1 << b;
                }
            }
            word ^ mask
        })
        .collect()
}

fn atom(label: &str) -> Value {
    json!({ "Atom": label })
}

fn inheritance(subject: &str, predicate: &str) -> Value {
    json!({ "Compound": ["Inheritance", [atom(subject), atom(predicate)]] })
}

fn main() -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let clusters: [(&str, &[&str]); 4] = [
        ("feline", &["tiger", "cat", "lion", "bobcat", "feline"]),
        ("canine", &["dog", "wolf", "fox", "coyote"]),
        ("vehicle", &["car", "truck", "bus", "tractor"]),
        ("fruit", &["apple", "pear", "plum"]),
    ];

    let mut records: Vec<Value> = Vec::new();
    for (category, members) in &clusters {
        let prototype = random_vector(&mut rng);

        for (i, member) in members.iter().enumerate() {
            // alternate between the two term encodings the exporter produces
            let term = if i % 2 == 0 {
                Value::String(member.to_string())
            } else {
                atom(member)
            };
            records.push(json!({
                "term": term,
                "usage": rng.gen_range(0..100u32),
                "vector": perturb(&prototype, NOISE, &mut rng),
            }));

            records.push(json!({
                "term": inheritance(member, category),
                "usage": rng.gen_range(0..20u32),
                "vector": perturb(&prototype, NOISE * 2.0, &mut rng),
            }));
        }
    }

    let output_path = "sample_concepts.json";
    let file = std::fs::File::create(output_path)
        .with_context(|| format!("creating {output_path}"))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &records)
        .context("writing concepts")?;

    println!(
        "Wrote {} concepts ({} bits each) to {output_path}",
        records.len(),
        WORDS * 64
    );
    Ok(())
}
