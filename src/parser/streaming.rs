//! Parser versions 2 and 3: one forward pass over the JSON token stream.
//!
//! Driven by `serde_json`'s deserializer through a chain of `DeserializeSeed`s
//! that write straight into the chunk, so no intermediate document is built.
//! Besides the strict array-of-arrays shape, a body holding exactly one row
//! written as a flat array of scalars is accepted. Mixing the two shapes, or
//! an object anywhere, is a structural failure.
//!
//! Failure classes: grammar and shape violations reported through serde's data
//! errors are `StructuralParse`; a truncated or lexically broken stream
//! (unterminated string, bad escape) is `Internal`; a failing reader is
//! `TransientIo`.

use std::fmt;
use std::io::{BufReader, Read};

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;

use crate::chunk::TextChunk;
use crate::error::{ChunkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowShape {
    Nested,
    Flat,
}

struct Sink<'c> {
    chunk: &'c mut TextChunk,
    shape: Option<RowShape>,
    /// The chunk-level error behind the last custom serde error, so its kind survives.
    failure: Option<ChunkError>,
}

impl Sink<'_> {
    fn record<E: de::Error>(&mut self, result: Result<()>) -> std::result::Result<(), E> {
        result.map_err(|e| {
            let message = e.to_string();
            self.failure = Some(e);
            E::custom(message)
        })
    }
}

fn classify(err: serde_json::Error) -> ChunkError {
    match err.classify() {
        Category::Io => ChunkError::transient(err),
        Category::Data => ChunkError::structural(err),
        Category::Syntax | Category::Eof => {
            ChunkError::Internal(format!("malformed chunk token stream: {}", err))
        }
    }
}

pub fn parse<R: Read>(reader: R, chunk: &mut TextChunk) -> Result<()> {
    let mut sink = Sink {
        chunk,
        shape: None,
        failure: None,
    };
    let mut de = serde_json::Deserializer::from_reader(BufReader::new(reader));
    let outcome = RowsSeed(&mut sink).deserialize(&mut de).and_then(|()| de.end());
    if let Err(e) = outcome {
        return Err(sink.failure.take().unwrap_or_else(|| classify(e)));
    }
    sink.chunk.finish()
}

/// Forwards the scalar visits of a visitor to its `scalar` method.
macro_rules! scalar_visits {
    () => {
        fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
            self.scalar(None)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<(), E> {
            self.scalar(Some(v.as_bytes()))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<(), E> {
            self.scalar(Some(if v { &b"true"[..] } else { &b"false"[..] }))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<(), E> {
            self.scalar(Some(v.to_string().as_bytes()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<(), E> {
            self.scalar(Some(v.to_string().as_bytes()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<(), E> {
            self.scalar(Some(v.to_string().as_bytes()))
        }
    };
}

//==================================================================================
// Top level: the array of rows
//==================================================================================

struct RowsSeed<'s, 'c>(&'s mut Sink<'c>);

impl<'de> DeserializeSeed<'de> for RowsSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for RowsSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of rows")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let sink = self.0;
        while seq.next_element_seed(RowSeed(&mut *sink))?.is_some() {}
        if sink.shape == Some(RowShape::Flat) {
            let closed = sink.chunk.end_row();
            sink.record::<A::Error>(closed)?;
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> std::result::Result<(), A::Error> {
        Err(de::Error::custom("unexpected token StartObject"))
    }
}

//==================================================================================
// One element of the top-level array: a nested row or a flat-row scalar
//==================================================================================

struct RowSeed<'s, 'c>(&'s mut Sink<'c>);

impl RowSeed<'_, '_> {
    fn scalar<E: de::Error>(self, value: Option<&[u8]>) -> std::result::Result<(), E> {
        let sink = self.0;
        match sink.shape {
            Some(RowShape::Nested) => {
                return Err(E::custom(
                    "unexpected scalar: a flat row cannot follow nested rows",
                ))
            }
            None => {
                sink.shape = Some(RowShape::Flat);
                let opened = sink.chunk.begin_row();
                sink.record::<E>(opened)?;
            }
            Some(RowShape::Flat) => {}
        }
        let pushed = sink.chunk.push_cell(value);
        sink.record(pushed)
    }
}

impl<'de> DeserializeSeed<'de> for RowSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for RowSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a row array or a scalar cell")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let sink = self.0;
        if sink.shape == Some(RowShape::Flat) {
            return Err(de::Error::custom(
                "unexpected token StartArray: a nested row cannot follow a flat row",
            ));
        }
        sink.shape = Some(RowShape::Nested);
        let opened = sink.chunk.begin_row();
        sink.record::<A::Error>(opened)?;
        while seq.next_element_seed(CellSeed(&mut *sink))?.is_some() {}
        let closed = sink.chunk.end_row();
        sink.record(closed)
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> std::result::Result<(), A::Error> {
        Err(de::Error::custom("unexpected token StartObject"))
    }

    scalar_visits!();
}

//==================================================================================
// One cell inside a nested row
//==================================================================================

struct CellSeed<'s, 'c>(&'s mut Sink<'c>);

impl CellSeed<'_, '_> {
    fn scalar<E: de::Error>(self, value: Option<&[u8]>) -> std::result::Result<(), E> {
        let pushed = self.0.chunk.push_cell(value);
        self.0.record(pushed)
    }
}

impl<'de> DeserializeSeed<'de> for CellSeed<'_, '_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for CellSeed<'_, '_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar cell")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> std::result::Result<(), A::Error> {
        Err(de::Error::custom("unexpected token StartArray inside a row"))
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> std::result::Result<(), A::Error> {
        Err(de::Error::custom("unexpected token StartObject"))
    }

    scalar_visits!();
}
