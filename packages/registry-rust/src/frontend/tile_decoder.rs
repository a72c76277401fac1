//! `tileDecoder` mode: factories that build decoders for one tile codec
//! format. Operations in this mode are keyed by format name.

use std::sync::Arc;

use bytes::Bytes;
use opreg_core::{
    DescriptorKind, FactoryRef, Raster, RegistryMode, RegistryResult, TileCodecParameterList,
    TileDecoder,
};

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Builds decoders over an encoded input stream.
pub trait TileDecoderFactory: Send + Sync {
    /// Creates a decoder reading from `input`. `params` is `None` when the
    /// caller wants the format's defaults.
    ///
    /// # Errors
    ///
    /// Any error is treated as "this factory declined".
    fn create_decoder(
        &self,
        input: Bytes,
        params: Option<&TileCodecParameterList>,
    ) -> anyhow::Result<Option<Box<dyn TileDecoder>>>;
}

/// Arguments handed to every candidate factory.
#[derive(Debug, Clone, Default)]
pub struct TileDecoderArgs {
    pub input: Bytes,
    pub params: Option<TileCodecParameterList>,
}

/// Marker for the `tileDecoder` mode.
#[derive(Debug, Clone, Copy)]
pub struct TileDecoderMode;

impl RegistryMode for TileDecoderMode {
    const NAME: &'static str = "tileDecoder";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Codec;
    const SUPPORTS_PREFERENCES: bool = true;
    const SUPPORTS_PROPERTIES: bool = false;

    type Factory = dyn TileDecoderFactory;
    type Args = TileDecoderArgs;
    type Output = Box<dyn TileDecoder>;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<Box<dyn TileDecoder>>> {
        factory.create_decoder(args.input.clone(), args.params.as_ref())
    }
}

frontend!(preferences: TileDecoderMode);

/// Creates a decoder for `format` over `input`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    format: &str,
    input: Bytes,
    params: Option<TileCodecParameterList>,
) -> RegistryResult<Option<Box<dyn TileDecoder>>> {
    resolve(registry).invoke::<TileDecoderMode>(format, &TileDecoderArgs { input, params })
}

/// Decodes a single tile placed at `origin`.
///
/// `Ok(None)` if no factory produced a decoder for `format`.
///
/// # Errors
///
/// Registry lookup errors, or the decoder's own error if the stream is
/// malformed.
pub fn decode(
    registry: Option<&OperationRegistry>,
    format: &str,
    input: Bytes,
    params: Option<TileCodecParameterList>,
    origin: (i32, i32),
) -> anyhow::Result<Option<Raster>> {
    let Some(mut decoder) = create(registry, format, input, params)? else {
        return Ok(None);
    };
    decoder.decode(origin).map(Some)
}
