//! WASM Memory Management
//!
//! Bounds-checked copy helpers between host buffers and guest linear memory.
//! Nothing here keeps a reference into guest memory past a single call: the
//! region can move when the guest grows its memory or gets reloaded.

use hiphop_kernel::MidiEvent;

use super::types::{WasmError, WasmResult};

/// Size of one serialized MIDI event header (frame + size)
pub const MIDI_EVENT_HEADER_SIZE: usize = 8;

const SAMPLE_SIZE: usize = std::mem::size_of::<f32>();

/// Guest pointer type (32-bit address in WASM linear memory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestPtr(pub u32);

impl GuestPtr {
    pub fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub fn offset(&self, bytes: u32) -> Self {
        Self(self.0.saturating_add(bytes))
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for GuestPtr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

impl From<GuestPtr> for u32 {
    fn from(ptr: GuestPtr) -> Self {
        ptr.0
    }
}

/// Validate `[offset, offset + len)` against a memory of `memory_len` bytes
pub fn checked_range(offset: usize, len: usize, memory_len: usize) -> WasmResult<std::ops::Range<usize>> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| WasmError::out_of_bounds(offset, len))?;
    if end > memory_len {
        return Err(WasmError::out_of_bounds(offset, len));
    }
    Ok(offset..end)
}

/// Bytes needed for `channels` channels of `frames` f32 samples
pub fn audio_block_size(channels: usize, frames: usize) -> WasmResult<usize> {
    channels
        .checked_mul(frames)
        .and_then(|n| n.checked_mul(SAMPLE_SIZE))
        .ok_or_else(|| WasmError::Internal("audio block size overflow".to_string()))
}

/// Read a null-terminated string starting at `offset`.
///
/// The scan stops at the terminator, the end of memory or `max_len` bytes,
/// whichever comes first. Invalid UTF-8 is replaced rather than rejected.
pub fn read_cstr(memory: &[u8], offset: usize, max_len: usize) -> WasmResult<String> {
    if offset >= memory.len() {
        return Err(WasmError::out_of_bounds(offset, 1));
    }
    let window = &memory[offset..memory.len().min(offset.saturating_add(max_len))];
    let len = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    Ok(String::from_utf8_lossy(&window[..len]).into_owned())
}

/// Write `s` plus a null terminator at `offset`
pub fn write_cstr(memory: &mut [u8], offset: usize, s: &str) -> WasmResult<()> {
    let bytes = s.as_bytes();
    let range = checked_range(offset, bytes.len() + 1, memory.len())?;
    let dst = &mut memory[range];
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0;
    Ok(())
}

/// Copy `channels` input channels channel-major into `dst`, little endian.
///
/// Channels the host did not provide are written as silence. The destination
/// range is validated before anything is written.
pub fn encode_channels(
    memory: &mut [u8],
    offset: usize,
    inputs: &[&[f32]],
    channels: usize,
    frames: usize,
) -> WasmResult<()> {
    let size = audio_block_size(channels, frames)?;
    let range = checked_range(offset, size, memory.len())?;
    if size == 0 {
        return Ok(());
    }
    for input in inputs.iter().take(channels) {
        if input.len() < frames {
            return Err(WasmError::Internal(format!(
                "input channel holds {} frames, block has {}",
                input.len(),
                frames
            )));
        }
    }

    let dst = &mut memory[range];
    for (ch, block) in dst.chunks_exact_mut(frames * SAMPLE_SIZE).enumerate() {
        match inputs.get(ch) {
            Some(input) => {
                for (bytes, sample) in block.chunks_exact_mut(SAMPLE_SIZE).zip(&input[..frames]) {
                    bytes.copy_from_slice(&sample.to_le_bytes());
                }
            }
            None => block.fill(0),
        }
    }
    Ok(())
}

/// Copy `channels` channel-major f32 channels out of `memory` into `outputs`.
///
/// Host output buffers beyond `channels` are filled with silence. Everything
/// is validated first so a failure leaves every output untouched.
pub fn decode_channels(
    memory: &[u8],
    offset: usize,
    outputs: &mut [&mut [f32]],
    channels: usize,
    frames: usize,
) -> WasmResult<()> {
    let size = audio_block_size(channels, frames)?;
    let range = checked_range(offset, size, memory.len())?;
    if let Some(short) = outputs.iter().find(|o| o.len() < frames) {
        return Err(WasmError::Internal(format!(
            "output channel holds {} frames, block has {}",
            short.len(),
            frames
        )));
    }

    let src = &memory[range];
    for (ch, output) in outputs.iter_mut().enumerate() {
        let output = &mut output[..frames];
        if ch < channels {
            let block = &src[ch * frames * SAMPLE_SIZE..(ch + 1) * frames * SAMPLE_SIZE];
            for (sample, bytes) in output.iter_mut().zip(block.chunks_exact(SAMPLE_SIZE)) {
                *sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        } else {
            output.fill(0.0);
        }
    }
    Ok(())
}

/// Bytes needed to serialize `events`
pub fn midi_block_size(events: &[MidiEvent<'_>]) -> usize {
    events
        .iter()
        .map(|e| MIDI_EVENT_HEADER_SIZE + e.data.len())
        .sum()
}

/// Serialize events as `{u32 frame, u32 size, data}` records, packed, little endian.
/// Returns the number of bytes written.
pub fn encode_midi_events(
    memory: &mut [u8],
    offset: usize,
    events: &[MidiEvent<'_>],
) -> WasmResult<usize> {
    let size = midi_block_size(events);
    let range = checked_range(offset, size, memory.len())?;
    let mut cursor = range.start;
    for event in events {
        memory[cursor..cursor + 4].copy_from_slice(&event.frame.to_le_bytes());
        memory[cursor + 4..cursor + 8].copy_from_slice(&event.size().to_le_bytes());
        cursor += MIDI_EVENT_HEADER_SIZE;
        memory[cursor..cursor + event.data.len()].copy_from_slice(event.data);
        cursor += event.data.len();
    }
    Ok(size)
}

/// Deserialize the single event record at `offset`
pub fn decode_midi_event(memory: &[u8], offset: usize) -> WasmResult<MidiEvent<'_>> {
    let header = checked_range(offset, MIDI_EVENT_HEADER_SIZE, memory.len())?;
    let h = &memory[header.clone()];
    let frame = u32::from_le_bytes([h[0], h[1], h[2], h[3]]);
    let size = u32::from_le_bytes([h[4], h[5], h[6], h[7]]) as usize;
    let data = checked_range(header.end, size, memory.len())?;
    Ok(MidiEvent::new(frame, &memory[data]))
}
