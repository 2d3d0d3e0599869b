//! Cached-data serialization for compiled scripts.
//!
//! A cache buffer is a self-contained image of a compiled chunk:
//!
//! ```text
//! offset 0   magic            b"JSBC"
//! offset 4   format version   u32 LE
//! offset 8   flags            u32 LE (REJECTED, UNCHECKED)
//! offset 12  source digest    u32 LE, derived from the source length
//! offset 16  payload length   u32 LE
//! offset 20  payload          serialized chunk tree
//! ```
//!
//! Validation happens in [`deserialize`]: magic, version tag, flags and the
//! source digest are checked against the supplied source before a single
//! payload byte is decoded. Any mismatch is reported as
//! [`Error::CacheRejected`] so embedders can distinguish "wrong engine
//! build / wrong source" from programming errors.
//!
//! The header offsets are part of the engine's public contract: embedders
//! that repair headers for source-less loading key off these constants
//! rather than hard-coding positions.

use std::rc::Rc;

use crate::Error;
use crate::compiler::{Chunk, Const, FunctionProto, Instruction, OpCode};

/// Magic bytes identifying a cache buffer.
pub const CACHE_MAGIC: [u8; 4] = *b"JSBC";

/// Version tag of the cache format produced by this engine build.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Byte offset of the flags word.
pub const FLAGS_OFFSET: usize = 8;

/// Byte offset of the source digest word.
pub const SOURCE_DIGEST_OFFSET: usize = 12;

/// Byte offset of the payload length word.
pub const PAYLOAD_LEN_OFFSET: usize = 16;

/// Total header size in bytes.
pub const HEADER_LEN: usize = 20;

/// Flag bit: the buffer was marked rejected by a producer or consumer.
pub const FLAG_REJECTED: u32 = 1 << 0;

/// Flag bit: skip source validation when consuming this buffer.
///
/// Set by embedders whose compile environment cannot guarantee a stable
/// source digest (the GUI-shell compile path).
pub const FLAG_UNCHECKED: u32 = 1 << 1;

/// The fixed stand-in source consumers supply when the original source text
/// is unavailable at load time.
pub const PLACEHOLDER_SOURCE: &[u8] = b"/* precompiled; source not shipped */";

/// Options controlling cache production.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Produce a buffer with [`FLAG_UNCHECKED`] set, so consumers skip the
    /// source digest comparison.
    pub skip_source_check: bool,
}

/// Digest recorded for (and validated against) a source buffer.
///
/// Only the length feeds the digest, so any stand-in of the right length
/// validates. FNV-1a over the little-endian length bytes.
pub fn source_digest(source_len: usize) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in (source_len as u32).to_le_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Returns true if the chunk is too trivial to be worth caching.
///
/// An empty program compiles to a lone `Halt`; the engine declines to
/// produce cached data for it, mirroring how production engines skip cache
/// creation for degenerate scripts.
pub fn is_degenerate(chunk: &Chunk) -> bool {
    chunk.code.len() <= 1 && chunk.consts.is_empty()
}

/// Serializes a chunk into a cache buffer.
pub fn serialize(chunk: &Chunk, source_len: usize, options: &CacheOptions) -> Vec<u8> {
    let mut payload = Vec::with_capacity(chunk.code.len() * 5 + 64);
    write_chunk(&mut payload, chunk);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&CACHE_MAGIC);
    out.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
    let flags = if options.skip_source_check {
        FLAG_UNCHECKED
    } else {
        0
    };
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&source_digest(source_len).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Validates a cache buffer against the supplied source and decodes it.
pub fn deserialize(source: &[u8], bytes: &[u8]) -> Result<Chunk, Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::CacheRejected("truncated header".into()));
    }
    if bytes[0..4] != CACHE_MAGIC {
        return Err(Error::CacheRejected("bad magic".into()));
    }
    let version = read_u32(bytes, 4);
    if version != CACHE_FORMAT_VERSION {
        return Err(Error::CacheRejected(format!(
            "cache format version {} does not match engine version {}",
            version, CACHE_FORMAT_VERSION
        )));
    }
    let flags = read_u32(bytes, FLAGS_OFFSET);
    if flags & FLAG_REJECTED != 0 {
        return Err(Error::CacheRejected("buffer is marked rejected".into()));
    }
    if flags & FLAG_UNCHECKED == 0 {
        let recorded = read_u32(bytes, SOURCE_DIGEST_OFFSET);
        let supplied = source_digest(source.len());
        if recorded != supplied {
            return Err(Error::CacheRejected(format!(
                "source digest mismatch: recorded {:#010x}, supplied {:#010x}",
                recorded, supplied
            )));
        }
    }
    let payload_len = read_u32(bytes, PAYLOAD_LEN_OFFSET) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(Error::CacheRejected(format!(
            "payload length mismatch: header says {}, buffer has {}",
            payload_len,
            payload.len()
        )));
    }

    let mut reader = Reader {
        bytes: payload,
        pos: 0,
    };
    let chunk = read_chunk(&mut reader)?;
    if reader.pos != payload.len() {
        return Err(Error::CacheRejected("trailing bytes in payload".into()));
    }
    Ok(chunk)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// Payload encoding. Fixed-width little-endian integers throughout, the same
// scheme for nested function prototypes as for the root chunk.

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn write_chunk(out: &mut Vec<u8>, chunk: &Chunk) {
    write_u32(out, chunk.consts.len() as u32);
    for constant in &chunk.consts {
        match constant {
            Const::Number(n) => {
                out.push(0);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Const::String(s) => {
                out.push(1);
                write_str(out, s);
            }
            Const::Function(proto) => {
                out.push(2);
                match &proto.name {
                    Some(name) => {
                        out.push(1);
                        write_str(out, name);
                    }
                    None => out.push(0),
                }
                write_u32(out, proto.params.len() as u32);
                for param in &proto.params {
                    write_str(out, param);
                }
                write_chunk(out, &proto.chunk);
            }
        }
    }
    write_u32(out, chunk.code.len() as u32);
    for instr in &chunk.code {
        out.push(instr.op as u8);
        write_u32(out, instr.operand);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], Error> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::CacheRejected("corrupt payload".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f64(&mut self) -> Result<f64, Error> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    fn str(&mut self) -> Result<String, Error> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::CacheRejected("corrupt payload: invalid string".into()))
    }
}

fn read_chunk(reader: &mut Reader<'_>) -> Result<Chunk, Error> {
    let const_count = reader.u32()? as usize;
    let mut consts = Vec::with_capacity(const_count.min(1024));
    for _ in 0..const_count {
        let constant = match reader.u8()? {
            0 => Const::Number(reader.f64()?),
            1 => Const::String(reader.str()?),
            2 => {
                let name = if reader.u8()? != 0 {
                    Some(reader.str()?)
                } else {
                    None
                };
                let param_count = reader.u32()? as usize;
                let mut params = Vec::with_capacity(param_count.min(64));
                for _ in 0..param_count {
                    params.push(reader.str()?);
                }
                let chunk = read_chunk(reader)?;
                Const::Function(Rc::new(FunctionProto {
                    name,
                    params,
                    chunk,
                }))
            }
            tag => {
                return Err(Error::CacheRejected(format!(
                    "corrupt payload: unknown constant tag {}",
                    tag
                )));
            }
        };
        consts.push(constant);
    }

    let code_count = reader.u32()? as usize;
    let mut code = Vec::with_capacity(code_count.min(65536));
    for _ in 0..code_count {
        let op = OpCode::from_byte(reader.u8()?).ok_or_else(|| {
            Error::CacheRejected("corrupt payload: unknown opcode".into())
        })?;
        let operand = reader.u32()?;
        code.push(Instruction { op, operand });
    }

    Ok(Chunk { code, consts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, Value};

    fn compile_chunk(src: &str) -> Chunk {
        let mut engine = Engine::new();
        let script = engine.compile(src).unwrap();
        script.chunk().clone()
    }

    #[test]
    fn test_serialize_roundtrip() {
        let src = "var x = 1; function f(a) { return a + x; } f(41);";
        let chunk = compile_chunk(src);
        let bytes = serialize(&chunk, src.len(), &CacheOptions::default());
        let decoded = deserialize(src.as_bytes(), &bytes).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_roundtrip_executes_identically() {
        let src = "function mul(a, b) { return a * b; } mul(6, 7);";
        let mut engine = Engine::new();
        let (script, bytes) = engine.compile_with_cache(src).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(engine.run(&script).unwrap(), Value::Number(42.0));

        let mut fresh = Engine::new();
        let restored = fresh.script_from_cache(src.as_bytes(), &bytes).unwrap();
        assert_eq!(fresh.run(&restored).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_degenerate_source_produces_no_cache() {
        let mut engine = Engine::new();
        let (_, bytes) = engine.compile_with_cache("").unwrap();
        assert!(bytes.is_empty());
        let (_, bytes) = engine.compile_with_cache("// only a comment").unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_wrong_source_is_rejected() {
        let src = "1 + 1;";
        let chunk = compile_chunk(src);
        let bytes = serialize(&chunk, src.len(), &CacheOptions::default());
        let err = deserialize(b"different length source", &bytes).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_unchecked_flag_skips_source_validation() {
        let src = "2 + 2;";
        let chunk = compile_chunk(src);
        let bytes = serialize(
            &chunk,
            src.len(),
            &CacheOptions {
                skip_source_check: true,
            },
        );
        assert!(deserialize(b"whatever", &bytes).is_ok());
    }

    #[test]
    fn test_rejected_flag_wins() {
        let src = "3;";
        let chunk = compile_chunk(src);
        let mut bytes = serialize(&chunk, src.len(), &CacheOptions::default());
        bytes[FLAGS_OFFSET] |= FLAG_REJECTED as u8;
        let err = deserialize(src.as_bytes(), &bytes).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let src = "4;";
        let chunk = compile_chunk(src);
        let bytes = serialize(&chunk, src.len(), &CacheOptions::default());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            deserialize(src.as_bytes(), &bad_magic),
            Err(Error::CacheRejected(_))
        ));

        let mut bad_version = bytes;
        bad_version[4] = 0xFF;
        assert!(matches!(
            deserialize(src.as_bytes(), &bad_version),
            Err(Error::CacheRejected(_))
        ));
    }

    #[test]
    fn test_corrupt_payload_is_rejected_not_panicking() {
        let src = "5 + 5;";
        let chunk = compile_chunk(src);
        let mut bytes = serialize(&chunk, src.len(), &CacheOptions::default());
        let len = bytes.len();
        bytes.truncate(len - 3);
        // Header payload length no longer matches
        assert!(matches!(
            deserialize(src.as_bytes(), &bytes),
            Err(Error::CacheRejected(_))
        ));
    }

    #[test]
    fn test_source_digest_depends_only_on_length() {
        assert_eq!(source_digest(10), source_digest(10));
        assert_ne!(source_digest(10), source_digest(11));
    }
}
