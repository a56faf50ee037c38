//! Result decoding.
//!
//! A [`ResultDecoder`] decides two things for an engine: which
//! `response_format` to request, and how to turn the final assistant content
//! into the caller's result type.
//!
//! | Decoder              | Requested format | Output                       |
//! |----------------------|------------------|------------------------------|
//! | [`TextDecoder`]      | `text`           | `String`, verbatim           |
//! | [`ObjectDecoder`]    | `json_object`    | `serde_json::Map`            |
//! | [`SchemaDecoder<T>`] | `json_schema`    | `T`, deserialized with serde |

use crate::Result;
use crate::schema::Described;
use crate::types::ResponseFormat;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Chooses the response format and decodes the final content.
pub trait ResultDecoder: Send + Sync {
    type Output;

    fn response_format(&self) -> ResponseFormat;

    fn decode(&self, content: &str) -> Result<Self::Output>;
}

/// Plain text result.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl ResultDecoder for TextDecoder {
    type Output = String;

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::Text
    }

    fn decode(&self, content: &str) -> Result<String> {
        Ok(content.to_string())
    }
}

/// Arbitrary JSON object result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectDecoder;

impl ResultDecoder for ObjectDecoder {
    type Output = Map<String, Value>;

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::JsonObject
    }

    fn decode(&self, content: &str) -> Result<Self::Output> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Schema-constrained result of type `T`.
///
/// The schema sent to the model is derived from `T`'s [`Described`] shape.
pub struct SchemaDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SchemaDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SchemaDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SchemaDecoder<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SchemaDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaDecoder")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ResultDecoder for SchemaDecoder<T>
where
    T: DeserializeOwned + Described,
{
    type Output = T;

    fn response_format(&self) -> ResponseFormat {
        ResponseFormat::json_schema(T::descriptor())
    }

    fn decode(&self, content: &str) -> Result<T> {
        Ok(serde_json::from_str(content)?)
    }
}
