//! Hashing, signing, and secure-serialization built-ins (component D's
//! "crypto" registry group, spec.md §4.3: the registry is "grouped by
//! concern: ... debugger, session, system, and crypto"). Thin script-facing
//! wrappers over [`crate::secure`] and the `sha2`/`hmac` primitives it uses,
//! plus a general-purpose cryptographically-random byte generator scripts
//! can reach for directly rather than only through `generateDocKey`.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    secure,
    value::Value,
};

type HmacSha256 = Hmac<Sha256>;

fn as_string(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<String> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.to_string()),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: argument {} must be a string, found {}", i + 1, other.map(Value::type_name).unwrap_or("nothing")))
                .with_pos(pos.clone()),
        )),
    }
}

fn as_tree_node(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<(crate::tree::arena::TreeArena, crate::tree::arena::NodeId)> {
    match args.get(i) {
        Some(Value::TreeNode(arena, id)) => Ok((arena.clone(), *id)),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: argument {} must be a tree node, found {}", i + 1, other.map(Value::type_name).unwrap_or("nothing")))
                .with_pos(pos.clone()),
        )),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str, name: &str, pos: &SourcePos) -> EvalResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Flow::Error(EngineError::validation(format!("{name}: hex string has odd length")).with_pos(pos.clone())));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| Flow::Error(EngineError::validation(format!("{name}: invalid hex digit")).with_pos(pos.clone()))))
        .collect()
}

fn sha256_hex(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let data = as_string(&args, 0, "sha256Hex", pos)?;
    Ok(Value::string(hex_encode(&Sha256::digest(data.as_bytes()))))
}

fn hmac_sha256_hex(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let key = as_string(&args, 0, "hmacSha256Hex", pos)?;
    let data = as_string(&args, 1, "hmacSha256Hex", pos)?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| Flow::Error(EngineError::validation(format!("hmacSha256Hex: invalid key: {e}")).with_pos(pos.clone())))?;
    mac.update(data.as_bytes());
    Ok(Value::string(hex_encode(&mac.finalize().into_bytes())))
}

fn random_hex(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let count = match args.first() {
        Some(Value::Number(n)) => *n as usize,
        _ => 16,
    };
    let mut bytes = vec![0u8; count];
    rand::thread_rng().fill_bytes(&mut bytes);
    Ok(Value::string(hex_encode(&bytes)))
}

/// `secureSeal(root, secret, signingKeyId, verificationKeyId, watermark, metadata?)`
/// -> hex-encoded sealed container (component I).
fn secure_seal(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, root) = as_tree_node(&args, 0, "secureSeal", pos)?;
    if !arena.same_arena(&eval.trees) {
        return Err(Flow::Error(EngineError::validation("secureSeal: tree node does not belong to this evaluator's forest").with_pos(pos.clone())));
    }
    let secret = as_string(&args, 1, "secureSeal", pos)?;
    let signing_key_id = as_string(&args, 2, "secureSeal", pos)?;
    let verification_key_id = as_string(&args, 3, "secureSeal", pos)?;
    let watermark = as_string(&args, 4, "secureSeal", pos)?;
    let metadata = match args.get(5) {
        Some(Value::Map(m)) => m
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect::<HashMap<String, String>>(),
        _ => HashMap::new(),
    };

    let container = secure::seal(&arena, root, secret.as_bytes(), &signing_key_id, &verification_key_id, &watermark, metadata)
        .map_err(Flow::Error)?;
    let bytes = secure::encode(&container).map_err(Flow::Error)?;
    Ok(Value::string(hex_encode(&bytes)))
}

/// `secureOpen(sealedHex, secret, requireSignature?)` -> a new tree node in
/// this evaluator's forest, restored from the sealed container.
fn secure_open(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let sealed_hex = as_string(&args, 0, "secureOpen", pos)?;
    let secret = as_string(&args, 1, "secureOpen", pos)?;
    let require_signature = !matches!(args.get(2), Some(v) if !v.truthy());

    let bytes = hex_decode(&sealed_hex, "secureOpen", pos)?;
    let container = secure::decode(&bytes).map_err(Flow::Error)?;
    let root = secure::open(&container, &eval.trees, secret.as_bytes(), require_signature).map_err(Flow::Error)?;
    Ok(Value::TreeNode(eval.trees.clone(), root))
}

/// `secureMetadata(sealedHex)` -> the container's free-form metadata map,
/// readable without the secret (spec.md §4.9).
fn secure_metadata(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let sealed_hex = as_string(&args, 0, "secureMetadata", pos)?;
    let bytes = hex_decode(&sealed_hex, "secureMetadata", pos)?;
    let container = secure::decode(&bytes).map_err(Flow::Error)?;
    let map = container.metadata().iter().map(|(k, v)| (k.clone(), Value::string(v.clone()))).collect();
    Ok(Value::map(map))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("sha256Hex", sha256_hex);
    table.register("hmacSha256Hex", hmac_sha256_hex);
    table.register("randomHex", random_hex);
    table.register("secureSeal", secure_seal);
    table.register("secureOpen", secure_open);
    table.register("secureMetadata", secure_metadata);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    #[test]
    fn sha256_hex_matches_a_known_digest() {
        let program = parse_program("test", r#"sha256Hex("")"#).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let Value::String(result) = eval.run(&program).unwrap() else { panic!("expected string") };
        assert_eq!(result.as_ref(), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }

    #[test]
    fn seal_then_open_roundtrips_through_script_builtins() {
        let program = parse_program(
            "test",
            r#"
            declare(root, newTree("doc"));
            setAttribute(root, "who", "alice");
            declare(sealed, secureSeal(root, "s3cr3t", "k1", "k1", "wm"));
            declare(restored, secureOpen(sealed, "s3cr3t"));
            getAttribute(restored, "who")
            "#,
        )
        .unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let Value::String(result) = eval.run(&program).unwrap() else { panic!("expected string") };
        assert_eq!(result.as_ref(), "alice");
    }
}
