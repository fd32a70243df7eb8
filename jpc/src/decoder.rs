use std::sync::Arc;

use log::{debug, info};

use crate::codec::TileCodec;
use crate::error::{ConfigError, DecodeError, TileDecodeError, TileIndexOutOfRange};
use crate::event::EventHandler;
use crate::header::{parse_header, Header, TileGridInfo};
use crate::image::ImageBuffer;
use crate::stream::ByteStream;
use crate::tile::TilePartition;
use crate::tile_decoder::{TileData, TileDecodeResult, TileDecoder};

/// Limits applied while reading the main header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub max_components: u16,

    // Samples are held as i32.
    pub max_bit_depth: u8,

    // Sum over all components.
    pub max_image_samples: u64,
}

impl Default for DecoderConfig {
    fn default() -> DecoderConfig {
        DecoderConfig {
            max_components: 16384,
            max_bit_depth: 31,
            max_image_samples: 1 << 30,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_components == 0 {
            return Err(ConfigError::NoComponents);
        }
        if self.max_bit_depth == 0 || self.max_bit_depth > 31 {
            return Err(ConfigError::BitDepth(self.max_bit_depth));
        }
        if self.max_image_samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,

    // Index of the tile that failed.
    Aborted(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Created,
    HeaderRead,
    Decoding,
    Finished(Outcome),
    Closed,
}

/// Progress reported while decoding tiles in order.
#[derive(Debug)]
pub enum TileProgress<'a> {
    Started(u32),
    Decoded(u32),
    Failed(u32, &'a TileDecodeError),
}

struct DecodeSession {
    stream: ByteStream,
    header: Header,
    grid: TileGridInfo,
    tile_decoder: TileDecoder,
    image: Option<ImageBuffer>,

    // Next tile for sequential decoding.
    next_tile: u32,
}

/// Drives one decoding session: header first, then tiles.
///
/// The decoder owns the stream from [`read_header`] until [`close`] or drop.
/// The first tile failure ends the session.
///
/// [`read_header`]: Decoder::read_header
/// [`close`]: Decoder::close
pub struct Decoder {
    codec: Arc<dyn TileCodec>,
    events: Box<dyn EventHandler>,
    config: DecoderConfig,
    state: DecoderState,
    session: Option<DecodeSession>,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

impl Decoder {
    pub fn new(codec: Arc<dyn TileCodec>, events: Box<dyn EventHandler>) -> Decoder {
        Decoder {
            codec,
            events,
            config: DecoderConfig::default(),
            state: DecoderState::Created,
            session: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Replaces the configuration. Only allowed before the header is read.
    pub fn setup(&mut self, config: DecoderConfig) -> Result<(), DecodeError> {
        if self.state != DecoderState::Created {
            return Err(DecodeError::InvalidState {
                operation: "setup",
                state: self.state,
            });
        }

        if let Err(error) = config.validate() {
            self.events.on_error(&error.to_string());
            return Err(error.into());
        }

        self.config = config;
        Ok(())
    }

    /// Parses the main header from the stream's current position.
    ///
    /// On failure the stream is closed and the decoder stays in
    /// [`DecoderState::Created`].
    pub fn read_header(&mut self, mut stream: ByteStream) -> Result<&Header, DecodeError> {
        if self.state != DecoderState::Created {
            return Err(DecodeError::InvalidState {
                operation: "read_header",
                state: self.state,
            });
        }

        let (header, grid) = match parse_header(&mut stream, &self.config, self.events.as_ref()) {
            Ok(parsed) => parsed,
            Err(error) => {
                stream.close();
                self.events.on_error(&error.to_string());
                return Err(error);
            }
        };

        self.events.on_info(&format!(
            "main header read: {}x{} image, {} components, {} tiles",
            header.width(),
            header.height(),
            header.no_components(),
            grid.total_tiles()
        ));
        info!(
            "first tile-part at byte offset {}",
            grid.first_tile_part_offset
        );

        let tile_decoder = TileDecoder::new(self.codec.clone(), &header, &grid);
        let image = ImageBuffer::new(&header);
        self.state = DecoderState::HeaderRead;

        let session = self.session.insert(DecodeSession {
            stream,
            header,
            grid,
            tile_decoder,
            image: Some(image),
            next_tile: 0,
        });

        Ok(&session.header)
    }

    pub fn header(&self) -> Option<&Header> {
        self.session.as_ref().map(|s| &s.header)
    }

    pub fn tile_grid(&self) -> Option<&TileGridInfo> {
        self.session.as_ref().map(|s| &s.grid)
    }

    pub fn partition(&self) -> Option<&TilePartition> {
        self.session.as_ref().map(|s| s.tile_decoder.partition())
    }

    pub fn image(&self) -> Option<&ImageBuffer> {
        self.session.as_ref().and_then(|s| s.image.as_ref())
    }

    /// Moves the image buffer out. Decoding further tiles is not possible
    /// afterwards.
    pub fn take_image(&mut self) -> Option<ImageBuffer> {
        self.session.as_mut().and_then(|s| s.image.take())
    }

    fn check_decodable(&self, operation: &'static str) -> Result<(), DecodeError> {
        match self.state {
            DecoderState::HeaderRead
            | DecoderState::Decoding
            | DecoderState::Finished(Outcome::Completed) => Ok(()),
            state => Err(DecodeError::InvalidState { operation, state }),
        }
    }

    /// Decodes tile `tile_index` and writes it into the image buffer.
    ///
    /// Tiles may be decoded in any order. Decoding a tile again returns the
    /// same samples and leaves the buffer untouched.
    pub fn decode_tile(&mut self, tile_index: u32) -> Result<TileData, DecodeError> {
        self.check_decodable("decode_tile")?;

        let state = self.state;
        let session = match self.session.as_mut() {
            Some(session) if session.image.is_some() => session,
            _ => {
                return Err(DecodeError::InvalidState {
                    operation: "decode_tile",
                    state,
                })
            }
        };

        let total_tiles = session.grid.total_tiles();
        if tile_index >= total_tiles {
            return Err(TileIndexOutOfRange {
                tile_index,
                total_tiles,
            }
            .into());
        }

        let result = session
            .tile_decoder
            .decode(&mut session.stream, &session.header, tile_index);

        match result {
            TileDecodeResult::Decoded(data) => {
                let mut complete = false;
                if let Some(image) = session.image.as_mut() {
                    if !image.is_tile_written(tile_index) {
                        image.write_tile(&data)?;
                    }
                    complete = image.is_complete();
                }
                debug!("tile {} of {} decoded", tile_index + 1, total_tiles);

                self.state = if complete {
                    DecoderState::Finished(Outcome::Completed)
                } else {
                    DecoderState::Decoding
                };
                Ok(data)
            }
            TileDecodeResult::Failed(error) => Err(self.abort(error)),
        }
    }

    fn abort(&mut self, error: TileDecodeError) -> DecodeError {
        self.events.on_error(&error.to_string());
        self.state = DecoderState::Finished(Outcome::Aborted(error.tile_index));
        error.into()
    }

    /// Decodes the tile at the sequential cursor, `None` once every tile has
    /// been visited.
    pub fn decode_next_tile(&mut self) -> Result<Option<TileData>, DecodeError> {
        self.check_decodable("decode_next_tile")?;

        let (next, total) = match self.session.as_ref() {
            Some(session) => (session.next_tile, session.grid.total_tiles()),
            None => {
                return Err(DecodeError::InvalidState {
                    operation: "decode_next_tile",
                    state: self.state,
                })
            }
        };
        if next >= total {
            return Ok(None);
        }

        let data = self.decode_tile(next)?;
        if let Some(session) = self.session.as_mut() {
            session.next_tile = next + 1;
        }
        Ok(Some(data))
    }

    /// Decodes the remaining tiles in raster order, stopping at the first
    /// failure.
    pub fn decode_tiles<F>(&mut self, mut observer: F) -> Result<Outcome, DecodeError>
    where
        F: FnMut(TileProgress<'_>),
    {
        self.check_decodable("decode_tiles")?;

        loop {
            let next = match self.session.as_ref() {
                Some(session) if session.next_tile < session.grid.total_tiles() => session.next_tile,
                _ => break,
            };

            observer(TileProgress::Started(next));
            match self.decode_next_tile() {
                Ok(_) => observer(TileProgress::Decoded(next)),
                Err(DecodeError::Tile(error)) => {
                    observer(TileProgress::Failed(next, &error));
                    return Ok(Outcome::Aborted(next));
                }
                Err(error) => return Err(error),
            }
        }

        self.state = DecoderState::Finished(Outcome::Completed);
        Ok(Outcome::Completed)
    }

    pub fn decode_all(&mut self) -> Result<Outcome, DecodeError> {
        self.decode_tiles(|_| {})
    }

    /// Like [`decode_tiles`](Decoder::decode_tiles), with reconstruction
    /// spread over the rayon thread pool.
    ///
    /// Tile data is read in order on the calling thread. Tiles after a known
    /// failure are skipped, and results are written and reported in tile
    /// index order.
    #[cfg(feature = "parallel")]
    pub fn decode_tiles_parallel<F>(&mut self, mut observer: F) -> Result<Outcome, DecodeError>
    where
        F: FnMut(TileProgress<'_>),
    {
        use rayon::prelude::*;
        use std::sync::atomic::{AtomicU32, Ordering};

        use crate::error::TileError;

        self.check_decodable("decode_tiles_parallel")?;

        let state = self.state;
        let session = match self.session.as_mut() {
            Some(session) if session.image.is_some() => session,
            _ => {
                return Err(DecodeError::InvalidState {
                    operation: "decode_tiles_parallel",
                    state,
                })
            }
        };

        let total_tiles = session.grid.total_tiles();
        let lowest_failure = AtomicU32::new(u32::MAX);

        let mut payloads = Vec::new();
        for i in session.next_tile..total_tiles {
            observer(TileProgress::Started(i));
            let payload = session
                .tile_decoder
                .read_payload(&mut session.stream, &session.header, i);
            let failed = payload.is_err();
            payloads.push((i, payload));
            if failed {
                lowest_failure.store(i, Ordering::Relaxed);
                break;
            }
        }

        let tile_decoder = &session.tile_decoder;
        let results: Vec<(u32, Option<Result<TileData, TileError>>)> = payloads
            .into_par_iter()
            .map(|(i, payload)| {
                if lowest_failure.load(Ordering::Relaxed) < i {
                    return (i, None);
                }
                let result = payload.and_then(|payload| tile_decoder.reconstruct(&payload));
                if result.is_err() {
                    lowest_failure.fetch_min(i, Ordering::Relaxed);
                }
                (i, Some(result))
            })
            .collect();

        for (i, result) in results {
            match result {
                Some(Ok(data)) => {
                    if let Some(image) = session.image.as_mut() {
                        if !image.is_tile_written(i) {
                            image.write_tile(&data)?;
                        }
                    }
                    session.next_tile = i + 1;
                    self.state = DecoderState::Decoding;
                    observer(TileProgress::Decoded(i));
                }
                Some(Err(reason)) => {
                    let error = TileDecodeError::new(i, reason);
                    observer(TileProgress::Failed(i, &error));
                    self.abort(error);
                    return Ok(Outcome::Aborted(i));
                }
                // Only tiles after a failure are skipped.
                None => break,
            }
        }

        self.state = DecoderState::Finished(Outcome::Completed);
        Ok(Outcome::Completed)
    }

    /// Releases the stream and buffers. Safe to call in any state, any
    /// number of times.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stream.close();
        }
        self.state = DecoderState::Closed;
    }
}
