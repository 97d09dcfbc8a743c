// AWACS/Screamer audio codec on the DAVBUS. Register traffic programs
// the codec control words and the output sample rate; playback drains the
// sound-output DBDMA channel on a cyclic timer and hands interleaved
// frames to the host audio sink. The sink is double buffered on the host
// side; this writer only ever advances.

use crate::dbdma::DmaChannelPtr;
use crate::fields::Size;
use crate::timers::TimersPtr;
use log::{debug, info};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

// Sound register block offsets.
const SND_CTRL: u32 = 0x00;
const SND_CODEC_CTRL: u32 = 0x10;
const SND_CODEC_STATUS: u32 = 0x20;
const SND_CLIP_COUNT: u32 = 0x30;
const SND_BYTE_SWAP: u32 = 0x40;

const CODEC_BUSY: u32 = 0x0100_0000;

// Output sample rates indexed by the rate field of the control register.
const SAMPLE_RATES: [u32; 8] = [44100, 29400, 22050, 17640, 14700, 11025, 8820, 7350];

const DRAIN_PERIOD_NS: u64 = 10_000_000; // 10 ms chunks

/// Host audio sink contract.
pub trait AudioOut {
    fn start(&mut self, sample_rate: u32);
    fn push_frames(&mut self, frames: &[i16]);
    fn stop(&mut self);
}

pub struct NullAudioOut;

impl AudioOut for NullAudioOut {
    fn start(&mut self, _sample_rate: u32) {}
    fn push_frames(&mut self, _frames: &[i16]) {}
    fn stop(&mut self) {}
}

/// rodio-backed sink used by the binary frontend.
pub struct RodioAudioOut {
    _stream: OutputStream,
    sink: Sink,
    rate: u32,
}

impl RodioAudioOut {
    pub fn new() -> anyhow::Result<Self> {
        let (stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        Ok(RodioAudioOut { _stream: stream, sink, rate: 44100 })
    }
}

impl AudioOut for RodioAudioOut {
    fn start(&mut self, sample_rate: u32) {
        self.rate = sample_rate;
        self.sink.play();
    }

    fn push_frames(&mut self, frames: &[i16]) {
        self.sink.append(SamplesBuffer::new(2, self.rate, frames.to_vec()));
    }

    fn stop(&mut self) {
        self.sink.pause();
    }
}

pub type AwacsPtr = Rc<RefCell<AwacsScreamer>>;

pub struct AwacsScreamer {
    me: Weak<RefCell<AwacsScreamer>>,
    timers: TimersPtr,
    audio_out: Box<dyn AudioOut>,
    dma_out: Option<DmaChannelPtr>,

    snd_ctrl: u32,
    codec_regs: [u16; 8],
    clip_count: u32,
    byte_swap: u32,
    playing: bool,
    drain_timer_id: u32,
}

impl AwacsScreamer {
    pub fn new(timers: TimersPtr, audio_out: Box<dyn AudioOut>) -> AwacsPtr {
        let dev = Rc::new(RefCell::new(AwacsScreamer {
            me: Weak::new(),
            timers,
            audio_out,
            dma_out: None,
            snd_ctrl: 0,
            codec_regs: [0; 8],
            clip_count: 0,
            byte_swap: 0,
            playing: false,
            drain_timer_id: 0,
        }));
        dev.borrow_mut().me = Rc::downgrade(&dev);
        dev
    }

    pub fn connect_dma_out(&mut self, ch: DmaChannelPtr) {
        self.dma_out = Some(ch);
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[((self.snd_ctrl >> 8) & 7) as usize]
    }

    pub fn snd_ctrl_read(&mut self, offset: u32, _size: Size) -> u32 {
        match offset & 0xF0 {
            SND_CTRL => self.snd_ctrl,
            SND_CODEC_CTRL => 0, // codec never stays busy
            SND_CODEC_STATUS => {
                // manufacturer Crystal, revision 3, all inputs present
                0x0030_0300 | ((self.codec_regs[1] as u32 & 0xFFF) << 4)
            }
            SND_CLIP_COUNT => {
                let value = self.clip_count;
                self.clip_count = 0;
                value
            }
            SND_BYTE_SWAP => self.byte_swap,
            _ => 0,
        }
    }

    pub fn snd_ctrl_write(&mut self, offset: u32, value: u32, _size: Size) {
        match offset & 0xF0 {
            SND_CTRL => {
                self.snd_ctrl = value;
                debug!("AWACS: sound control = 0x{:08X}, rate {} Hz", value, self.sample_rate());
            }
            SND_CODEC_CTRL => {
                let reg = ((value >> 12) & 7) as usize;
                self.codec_regs[reg] = (value & 0xFFF) as u16;
                debug!("AWACS: codec register {} = 0x{:03X}", reg, value & 0xFFF);
                if value & CODEC_BUSY == 0 && reg == 1 {
                    // register 1 carries the mute/output-enable bits
                    let muted = self.codec_regs[1] & 0x80 != 0;
                    if muted {
                        self.stop_playback();
                    } else {
                        self.start_playback();
                    }
                }
            }
            SND_BYTE_SWAP => self.byte_swap = value,
            _ => debug!("AWACS: write 0x{:X} to sound register 0x{:X}", value, offset),
        }
    }

    /// Raw codec word access for the AMIC immediate sound registers.
    pub fn write_codec_reg(&mut self, addr: u8, value: u16) {
        let reg = (addr & 7) as usize;
        self.codec_regs[reg] = value & 0xFFF;
        debug!("AWACS: codec register {} = 0x{:03X} (immediate)", reg, value & 0xFFF);
    }

    pub fn read_stat(&self) -> u32 {
        0x0030_0300 | ((self.codec_regs[1] as u32 & 0xFFF) << 4)
    }

    pub fn set_rate_index(&mut self, idx: u32) {
        self.snd_ctrl = (self.snd_ctrl & !0x700) | ((idx & 7) << 8);
    }

    fn start_playback(&mut self) {
        if self.playing {
            return;
        }
        info!("AWACS: playback started at {} Hz", self.sample_rate());
        self.playing = true;
        let rate = self.sample_rate();
        self.audio_out.start(rate);
        let me = self.me.clone();
        self.drain_timer_id = self.timers.borrow_mut().add_cyclic_timer(
            DRAIN_PERIOD_NS,
            Rc::new(move || {
                if let Some(dev) = me.upgrade() {
                    dev.borrow_mut().drain_dma();
                }
            }),
        );
    }

    fn stop_playback(&mut self) {
        if !self.playing {
            return;
        }
        info!("AWACS: playback stopped");
        self.playing = false;
        self.audio_out.stop();
        if self.drain_timer_id != 0 {
            self.timers.borrow_mut().cancel_timer(self.drain_timer_id);
            self.drain_timer_id = 0;
        }
    }

    // One drain period worth of interleaved 16-bit big-endian frames.
    fn drain_dma(&mut self) {
        let ch = match &self.dma_out {
            Some(ch) => Rc::clone(ch),
            None => return,
        };
        let bytes_wanted = (self.sample_rate() as u64 * 4 * DRAIN_PERIOD_NS / 1_000_000_000) as usize & !3;
        let mut raw = Vec::with_capacity(bytes_wanted);
        ch.borrow_mut().pull_data(bytes_wanted, &mut raw);
        if raw.is_empty() {
            return;
        }
        let mut frames = Vec::with_capacity(raw.len() / 2);
        for pair in raw.chunks_exact(2) {
            frames.push(i16::from_be_bytes([pair[0], pair[1]]));
        }
        self.audio_out.push_frames(&frames);
    }
}

impl Drop for AwacsScreamer {
    fn drop(&mut self) {
        if self.drain_timer_id != 0 {
            self.timers.borrow_mut().cancel_timer(self.drain_timer_id);
        }
    }
}
