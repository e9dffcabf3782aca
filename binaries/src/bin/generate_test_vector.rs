// SPDX-License-Identifier: MPL-2.0

use color_eyre::eyre::{eyre, Result, WrapErr};
use poplar_idpf::{
    codec::Encode,
    field::{Field128, Field64},
    idpf::{Idpf, IdpfOutputShares, IdpfParameters, IdpfPoplar, SEED_SIZE},
    xof::{Xof, XofHmacSha256Aes128, XofShake128, XofTurboShake128},
};
use serde::Serialize;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "generate-test-vector",
    about = "Generate a deterministic IDPF test vector",
    rename_all = "kebab-case",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Options {
    /// Bit length of the inputs
    #[structopt(short, long, default_value = "4")]
    bits: usize,
    /// Length of the vector programmed at each level
    #[structopt(short, long, default_value = "2")]
    value_len: usize,
    /// The programmed input
    #[structopt(short, long, default_value = "11")]
    alpha: u128,
    /// Binder string mixed into every node derivation
    #[structopt(long, default_value = "")]
    binder: String,
    /// XOF used to derive tree nodes: turboshake128, shake128 or hmac-sha256-aes128
    #[structopt(long, default_value = "turboshake128")]
    xof: String,
}

#[derive(Debug, Serialize)]
struct Evaluation {
    level: usize,
    prefixes: Vec<String>,
    /// Hex-encoded output shares, indexed by party and then by prefix.
    output_shares: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct TestVector {
    xof: String,
    parameters: IdpfParameters,
    binder: String,
    alpha: String,
    beta_inner: Vec<Vec<u64>>,
    beta_leaf: Vec<String>,
    rand: String,
    public_share: String,
    keys: Vec<String>,
    evaluations: Vec<Evaluation>,
}

fn encode_vector<E: Encode>(vector: &[E]) -> String {
    let mut bytes = Vec::new();
    for element in vector {
        element.encode(&mut bytes);
    }
    hex::encode(bytes)
}

fn encode_output_shares(output_shares: &IdpfOutputShares<Field64, Field128>) -> Vec<String> {
    match output_shares {
        IdpfOutputShares::Inner(vectors) => vectors.iter().map(|v| encode_vector(v)).collect(),
        IdpfOutputShares::Leaf(vectors) => vectors.iter().map(|v| encode_vector(v)).collect(),
    }
}

fn generate<P: Xof<SEED_SIZE>>(options: &Options) -> Result<TestVector> {
    let idpf = IdpfPoplar::<P>::new(options.bits, options.value_len)
        .wrap_err("invalid IDPF parameters")?
        .with_binder(options.binder.as_bytes());

    let beta_inner: Vec<Vec<Field64>> = (0..options.bits - 1)
        .map(|level| vec![Field64::from(level as u64 + 1); options.value_len])
        .collect();
    let beta_leaf = vec![Field128::from(options.bits as u128); options.value_len];
    let rand: Vec<u8> = (0..IdpfPoplar::<P>::RAND_SIZE).map(|i| i as u8).collect();

    let (public_share, keys) = idpf
        .gen(options.alpha, &beta_inner, &beta_leaf, &rand)
        .wrap_err("key generation failed")?;

    let mut evaluations = Vec::with_capacity(options.bits);
    for level in 0..options.bits {
        let on_path = options.alpha >> (options.bits - 1 - level);
        let prefixes = [on_path, on_path ^ 1];
        let mut output_shares = Vec::with_capacity(keys.len());
        for (agg_id, key) in keys.iter().enumerate() {
            let shares = idpf
                .eval(agg_id, &public_share, key, level, &prefixes)
                .wrap_err_with(|| format!("evaluation failed at level {level}"))?;
            output_shares.push(encode_output_shares(&shares));
        }
        evaluations.push(Evaluation {
            level,
            prefixes: prefixes.iter().map(u128::to_string).collect(),
            output_shares,
        });
    }

    Ok(TestVector {
        xof: options.xof.clone(),
        parameters: idpf.parameters(),
        binder: hex::encode(options.binder.as_bytes()),
        alpha: options.alpha.to_string(),
        beta_inner: beta_inner
            .iter()
            .map(|beta| beta.iter().map(|x| u64::from(*x)).collect())
            .collect(),
        beta_leaf: beta_leaf.iter().map(|x| u128::from(*x).to_string()).collect(),
        rand: hex::encode(&rand),
        public_share: hex::encode(&public_share),
        keys: keys.iter().map(hex::encode).collect(),
        evaluations,
    })
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let options = Options::from_args();

    let test_vector = match options.xof.as_str() {
        "turboshake128" => generate::<XofTurboShake128>(&options)?,
        "shake128" => generate::<XofShake128>(&options)?,
        "hmac-sha256-aes128" => generate::<XofHmacSha256Aes128>(&options)?,
        other => return Err(eyre!("unknown XOF: {other}")),
    };
    let json =
        serde_json::to_string(&test_vector).wrap_err("failed to encode test vector to JSON")?;
    println!("{}", json);

    Ok(())
}
