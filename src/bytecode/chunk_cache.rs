//! Binary serialization of compiled chunks.
//!
//! Layout: magic, format version, SHA-256 of the code bytes, code, scalar
//! constant pool, then the location table encoded as JSON. Object constants
//! cannot be serialized because their handles only mean something inside a
//! live heap.

use std::io::{Read, Write};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    bytecode::chunk::{Chunk, InstructionLocation},
    bytecode::token::Token,
    runtime::value::{Permission, VALUE_BYTES, Value},
};

const MAGIC: &[u8; 4] = b"CYBC";
const FORMAT_VERSION: u16 = 1;
const MAX_RESERVED_CONSTANTS: usize = 1024;

#[derive(Debug, Error)]
pub enum ChunkCacheError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a chunk file")]
    BadMagic,
    #[error("unsupported chunk format version {0}")]
    UnsupportedVersion(u16),
    #[error("chunk fingerprint does not match its code")]
    FingerprintMismatch,
    #[error("constant {0} is an object and cannot be serialized")]
    UnsupportedConstant(usize),
    #[error("truncated or malformed chunk data")]
    Truncated,
}

pub fn fingerprint(code: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(code);
    hasher.finalize().into()
}

pub fn write_chunk<W: Write>(writer: &mut W, chunk: &Chunk) -> Result<(), ChunkCacheError> {
    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&fingerprint(&chunk.code))?;

    write_u32(writer, chunk.code.len() as u32)?;
    writer.write_all(&chunk.code)?;

    write_u32(writer, chunk.constants.len() as u32)?;
    for (index, constant) in chunk.constants.iter().enumerate() {
        let bytes = constant
            .serialize(Permission::Mutable)
            .ok_or(ChunkCacheError::UnsupportedConstant(index))?;
        writer.write_all(&bytes)?;
    }

    let table: Vec<(usize, &Token)> = chunk
        .locations
        .iter()
        .map(|entry| (entry.offset, &entry.token))
        .collect();
    let json = serde_json::to_vec(&table).map_err(|_| ChunkCacheError::Truncated)?;
    write_u32(writer, json.len() as u32)?;
    writer.write_all(&json)?;

    Ok(())
}

pub fn read_chunk<R: Read>(reader: &mut R) -> Result<Chunk, ChunkCacheError> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic)?;
    if &magic != MAGIC {
        return Err(ChunkCacheError::BadMagic);
    }

    let mut version = [0u8; 2];
    read_exact(reader, &mut version)?;
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(ChunkCacheError::UnsupportedVersion(version));
    }

    let mut expected = [0u8; 32];
    read_exact(reader, &mut expected)?;

    let code_len = read_u32(reader)?;
    let code = read_bytes(reader, code_len)?;
    if fingerprint(&code) != expected {
        return Err(ChunkCacheError::FingerprintMismatch);
    }

    // Counts come from the file, so capacity is only reserved up to a bound.
    let constants_count = read_u32(reader)? as usize;
    let mut constants = Vec::with_capacity(constants_count.min(MAX_RESERVED_CONSTANTS));
    for _ in 0..constants_count {
        let mut bytes = [0u8; VALUE_BYTES];
        read_exact(reader, &mut bytes)?;
        let (value, _) = Value::deserialize(&bytes).ok_or(ChunkCacheError::Truncated)?;
        constants.push(value);
    }

    let json_len = read_u32(reader)?;
    let json = read_bytes(reader, json_len)?;
    let table: Vec<(usize, Token)> =
        serde_json::from_slice(&json).map_err(|_| ChunkCacheError::Truncated)?;
    let locations = table
        .into_iter()
        .map(|(offset, token)| InstructionLocation { offset, token })
        .collect();

    Ok(Chunk {
        code,
        constants,
        locations,
    })
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> std::io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ChunkCacheError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a length-prefixed section. The buffer grows with the data actually
/// read, so a forged length fails as `Truncated` instead of allocating it.
fn read_bytes<R: Read>(reader: &mut R, len: u32) -> Result<Vec<u8>, ChunkCacheError> {
    let mut buf = Vec::new();
    reader.by_ref().take(u64::from(len)).read_to_end(&mut buf)?;
    if buf.len() != len as usize {
        return Err(ChunkCacheError::Truncated);
    }
    Ok(buf)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ChunkCacheError> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => ChunkCacheError::Truncated,
        _ => ChunkCacheError::Io(err),
    })
}
