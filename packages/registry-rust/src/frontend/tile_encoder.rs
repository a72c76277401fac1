//! `tileEncoder` mode: factories that build encoders for one tile codec
//! format. Operations in this mode are keyed by format name.

use std::io::Write;
use std::sync::Arc;

use opreg_core::{
    DescriptorKind, FactoryRef, Raster, RegistryMode, RegistryResult, SampleLayout,
    TileCodecParameterList, TileEncoder,
};
use parking_lot::Mutex;

use crate::default_registry::resolve;
use crate::registry::OperationRegistry;

/// Shared output sink. Every candidate factory sees the same sink, so a
/// factory must not write to it before it commits to handling the request.
pub type TileSink = Arc<Mutex<dyn Write + Send>>;

/// Builds encoders that write to a sink.
pub trait TileEncoderFactory: Send + Sync {
    /// Creates an encoder for tiles of `layout`. `params` is `None` when
    /// the caller wants the format's defaults.
    ///
    /// # Errors
    ///
    /// Any error is treated as "this factory declined".
    fn create_encoder(
        &self,
        output: TileSink,
        params: Option<&TileCodecParameterList>,
        layout: SampleLayout,
    ) -> anyhow::Result<Option<Box<dyn TileEncoder>>>;
}

/// Arguments handed to every candidate factory.
#[derive(Clone)]
pub struct TileEncoderArgs {
    pub output: TileSink,
    pub params: Option<TileCodecParameterList>,
    pub layout: SampleLayout,
}

/// Marker for the `tileEncoder` mode.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoderMode;

impl RegistryMode for TileEncoderMode {
    const NAME: &'static str = "tileEncoder";
    const DESCRIPTOR_KIND: DescriptorKind = DescriptorKind::Codec;
    const SUPPORTS_PREFERENCES: bool = true;
    const SUPPORTS_PROPERTIES: bool = false;

    type Factory = dyn TileEncoderFactory;
    type Args = TileEncoderArgs;
    type Output = Box<dyn TileEncoder>;

    fn invoke(
        factory: &Self::Factory,
        args: &Self::Args,
    ) -> anyhow::Result<Option<Box<dyn TileEncoder>>> {
        factory.create_encoder(Arc::clone(&args.output), args.params.as_ref(), args.layout)
    }
}

frontend!(preferences: TileEncoderMode);

/// Creates an encoder for `format` writing to `output`.
///
/// # Errors
///
/// See [`OperationRegistry::invoke`].
pub fn create(
    registry: Option<&OperationRegistry>,
    format: &str,
    output: TileSink,
    params: Option<TileCodecParameterList>,
    layout: SampleLayout,
) -> RegistryResult<Option<Box<dyn TileEncoder>>> {
    let args = TileEncoderArgs {
        output,
        params,
        layout,
    };
    resolve(registry).invoke::<TileEncoderMode>(format, &args)
}

/// Encodes `raster` with the best encoder for `format`.
///
/// Returns `false` if no factory produced an encoder.
///
/// # Errors
///
/// Registry lookup errors, or the encoder's own error.
pub fn encode(
    registry: Option<&OperationRegistry>,
    format: &str,
    output: TileSink,
    params: Option<TileCodecParameterList>,
    raster: &Raster,
) -> anyhow::Result<bool> {
    let Some(mut encoder) = create(registry, format, output, params, raster.layout)? else {
        return Ok(false);
    };
    encoder.encode(raster)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use opreg_core::Descriptor;

    use super::*;

    /// Writes samples verbatim; only 8-bit layouts.
    struct RawFactory;

    struct RawEncoder {
        output: TileSink,
        layout: SampleLayout,
    }

    impl TileEncoderFactory for RawFactory {
        fn create_encoder(
            &self,
            output: TileSink,
            _params: Option<&TileCodecParameterList>,
            layout: SampleLayout,
        ) -> anyhow::Result<Option<Box<dyn TileEncoder>>> {
            if layout.bits_per_sample != 8 {
                return Ok(None);
            }
            Ok(Some(Box::new(RawEncoder { output, layout })))
        }
    }

    impl TileEncoder for RawEncoder {
        fn format_name(&self) -> &str {
            "raw"
        }

        fn encode(&mut self, raster: &Raster) -> anyhow::Result<()> {
            if raster.layout != self.layout {
                anyhow::bail!("layout mismatch");
            }
            self.output.lock().write_all(&raster.samples)?;
            Ok(())
        }
    }

    /// Prefixes the tile with its byte length; accepts any depth.
    struct FramedFactory;

    struct FramedEncoder {
        output: TileSink,
    }

    impl TileEncoderFactory for FramedFactory {
        fn create_encoder(
            &self,
            output: TileSink,
            _params: Option<&TileCodecParameterList>,
            _layout: SampleLayout,
        ) -> anyhow::Result<Option<Box<dyn TileEncoder>>> {
            Ok(Some(Box::new(FramedEncoder { output })))
        }
    }

    impl TileEncoder for FramedEncoder {
        fn format_name(&self) -> &str {
            "raw"
        }

        fn encode(&mut self, raster: &Raster) -> anyhow::Result<()> {
            let len = u32::try_from(raster.samples.len())?;
            let mut out = self.output.lock();
            out.write_all(&len.to_be_bytes())?;
            out.write_all(&raster.samples)?;
            Ok(())
        }
    }

    fn registry() -> OperationRegistry {
        let registry = OperationRegistry::new();
        registry
            .register_descriptor(Descriptor::new("raw", DescriptorKind::Codec).with_mode("tileEncoder"))
            .unwrap();
        registry
    }

    fn raster(bits_per_sample: u8) -> Raster {
        Raster {
            origin: (0, 0),
            layout: SampleLayout {
                width: 2,
                height: 1,
                num_bands: 1,
                bits_per_sample,
            },
            samples: Bytes::from_static(&[9, 8]),
        }
    }

    fn sink() -> (Arc<Mutex<Vec<u8>>>, TileSink) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink: TileSink = buffer.clone();
        (buffer, sink)
    }

    #[test]
    fn encodes_with_first_accepting_factory() {
        let registry = registry();
        let raw: Arc<dyn TileEncoderFactory> = Arc::new(RawFactory);
        let framed: Arc<dyn TileEncoderFactory> = Arc::new(FramedFactory);
        register(Some(&registry), "raw", "acme", Arc::clone(&framed)).unwrap();
        register(Some(&registry), "raw", "acme", Arc::clone(&raw)).unwrap();
        set_preference(Some(&registry), "raw", "acme", &raw, &framed).unwrap();

        let (buffer, out) = sink();
        assert!(encode(Some(&registry), "raw", out, None, &raster(8)).unwrap());
        assert_eq!(*buffer.lock(), vec![9, 8]);

        // 16-bit layout: raw declines, framed takes over.
        let (buffer, out) = sink();
        assert!(encode(Some(&registry), "raw", out, None, &raster(16)).unwrap());
        assert_eq!(*buffer.lock(), vec![0, 0, 0, 2, 9, 8]);
    }

    #[test]
    fn no_encoder_reports_false() {
        let registry = registry();
        register(Some(&registry), "raw", "acme", Arc::new(RawFactory)).unwrap();
        let (buffer, out) = sink();
        assert!(!encode(Some(&registry), "raw", out, None, &raster(16)).unwrap());
        assert!(buffer.lock().is_empty());
    }

    #[test]
    fn ordered_list_follows_preferences() {
        let registry = registry();
        let raw: Arc<dyn TileEncoderFactory> = Arc::new(RawFactory);
        let framed: Arc<dyn TileEncoderFactory> = Arc::new(FramedFactory);
        register(Some(&registry), "raw", "acme", Arc::clone(&raw)).unwrap();
        register(Some(&registry), "raw", "acme", Arc::clone(&framed)).unwrap();
        set_preference(Some(&registry), "raw", "acme", &framed, &raw).unwrap();

        let ordered = get_ordered_list(Some(&registry), "raw", "acme")
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&ordered[0], &framed));

        set_preference(Some(&registry), "raw", "acme", &raw, &framed).unwrap();
        assert!(get_ordered_list(Some(&registry), "raw", "acme")
            .unwrap()
            .is_none());
    }
}
