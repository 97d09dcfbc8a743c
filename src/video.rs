// Video controllers. A shared CRTC core turns timing words into a refresh
// rate, owns the palette, and runs the per-frame conversion from guest
// framebuffer format to the display's ARGB target. Concrete cells wrap it:
// Control (the 7500-class Swatch/RaDACal combo) and ATI Mach64 GX. The
// host window sits behind the Display contract; monitor identity comes
// from the sense-line table keyed by mon_id.

use crate::interrupts::IntCtrlPtr;
use crate::memory::{BytesPtr, MmioDevice};
use crate::fields::Size;
use crate::timers::{TimersPtr, NS_PER_SEC};
use log::{debug, info, warn};
use minifb::{Window, WindowOptions};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Host display contract: the frontend locks its texture, receives whole
/// converted rows, and unlocks on return.
pub trait Display {
    fn set_mode(&mut self, width: usize, height: usize);
    fn update_frame(&mut self, argb: &[u32], width: usize, height: usize);
}

pub type DisplayPtr = Rc<RefCell<dyn Display>>;

pub struct NullDisplay;

impl Display for NullDisplay {
    fn set_mode(&mut self, _width: usize, _height: usize) {}
    fn update_frame(&mut self, _argb: &[u32], _width: usize, _height: usize) {}
}

/// minifb-backed window for the binary frontend.
pub struct WindowDisplay {
    window: Option<Window>,
    title: String,
}

impl WindowDisplay {
    pub fn new(title: &str) -> Self {
        WindowDisplay { window: None, title: title.to_string() }
    }

    pub fn is_open(&self) -> bool {
        self.window.as_ref().map(|w| w.is_open()).unwrap_or(true)
    }
}

impl Display for WindowDisplay {
    fn set_mode(&mut self, width: usize, height: usize) {
        if width == 0 || height == 0 {
            return;
        }
        let window = Window::new(&self.title, width, height, WindowOptions::default())
            .unwrap_or_else(|e| panic!("Cannot open display window: {}", e));
        self.window = Some(window);
    }

    fn update_frame(&mut self, argb: &[u32], width: usize, height: usize) {
        if let Some(window) = self.window.as_mut() {
            window.update_with_buffer(argb, width, height).expect("Error updating screen!");
        }
    }
}

// ------------------------------------------------------------ monitor ids

pub struct MonitorInfo {
    pub name: &'static str,
    pub std_sense: u8,
    pub ext_sense: u8, // three 2-bit groups: sense2-, sense1-, sense0-driven
    pub width: usize,
    pub height: usize,
}

pub static MONITORS: &[MonitorInfo] = &[
    MonitorInfo { name: "MacRGB21in", std_sense: 0, ext_sense: 0x00, width: 1152, height: 870 },
    MonitorInfo { name: "PortraitGS", std_sense: 1, ext_sense: 0x14, width: 640, height: 870 },
    MonitorInfo { name: "MacRGB12in", std_sense: 2, ext_sense: 0x21, width: 512, height: 384 },
    MonitorInfo { name: "TwoPage21in", std_sense: 3, ext_sense: 0x35, width: 1152, height: 870 },
    MonitorInfo { name: "NTSC", std_sense: 4, ext_sense: 0x0A, width: 512, height: 384 },
    MonitorInfo { name: "MacRGB15in", std_sense: 5, ext_sense: 0x1E, width: 640, height: 870 },
    MonitorInfo { name: "HiRes12-14in", std_sense: 6, ext_sense: 0x2B, width: 640, height: 480 },
    MonitorInfo { name: "Multiscan15in", std_sense: 7, ext_sense: 0x03, width: 640, height: 480 },
    MonitorInfo { name: "Multiscan17in", std_sense: 7, ext_sense: 0x0B, width: 832, height: 624 },
    MonitorInfo { name: "Multiscan20in", std_sense: 7, ext_sense: 0x23, width: 1024, height: 768 },
    MonitorInfo { name: "NotConnected", std_sense: 7, ext_sense: 0x3F, width: 0, height: 0 },
];

pub fn monitor_by_name(name: &str) -> &'static MonitorInfo {
    MONITORS
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("Unknown monitor id '{}'!", name))
}

impl MonitorInfo {
    /// Tri-state sense protocol: with all lines floating the standard
    /// code reads back; driving a single line low selects one 2-bit
    /// group of the extended code on the other two lines.
    pub fn read_sense(&self, levels: u8, dirs: u8) -> u8 {
        match dirs {
            0 => self.std_sense,
            0b100 => {
                let group = (self.ext_sense >> 4) & 3;
                (levels & 0b100) | group
            }
            0b010 => {
                let group = (self.ext_sense >> 2) & 3;
                (levels & 0b010) | ((group >> 1) << 2) | (group & 1)
            }
            0b001 => {
                let group = self.ext_sense & 3;
                (levels & 0b001) | (group << 1)
            }
            _ => self.std_sense,
        }
    }
}

// --------------------------------------------------------------- CRTC core

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PixelDepth {
    Indexed4,
    Indexed8,
    Rgb555,
    Rgb888,
    Argb32,
}

impl PixelDepth {
    pub fn bits(self) -> usize {
        match self {
            PixelDepth::Indexed4 => 4,
            PixelDepth::Indexed8 => 8,
            PixelDepth::Rgb555 => 16,
            PixelDepth::Rgb888 => 24,
            PixelDepth::Argb32 => 32,
        }
    }
}

pub struct Crtc {
    pub active_width: usize,
    pub active_height: usize,
    pub hori_total: u32,  // pixels per line including blanking
    pub vert_total: u32,  // lines per frame including blanking
    pub pixel_clock: u32, // Hz
    pub depth: PixelDepth,
    pub fb_base: u32,
    pub fb_pitch: usize,
    pub palette: [u32; 256],
    timers: TimersPtr,
    refresh_timer_id: u32,
}

impl Crtc {
    pub fn new(timers: TimersPtr) -> Self {
        Crtc {
            active_width: 0,
            active_height: 0,
            hori_total: 0,
            vert_total: 0,
            pixel_clock: 0,
            depth: PixelDepth::Indexed8,
            fb_base: 0,
            fb_pitch: 0,
            palette: [0xFF00_0000; 256],
            timers,
            refresh_timer_id: 0,
        }
    }

    pub fn refresh_rate(&self) -> f64 {
        if self.hori_total == 0 || self.vert_total == 0 {
            0.0
        } else {
            self.pixel_clock as f64 / (self.hori_total as f64 * self.vert_total as f64)
        }
    }

    pub fn start_refresh(&mut self, cb: crate::timers::Callback) {
        self.stop_refresh();
        let rate = self.refresh_rate();
        if rate <= 0.0 {
            warn!("CRTC: refusing to start refresh with zero rate");
            return;
        }
        info!(
            "CRTC: refresh task started, {}x{} at {:.2} Hz",
            self.active_width, self.active_height, rate
        );
        let period = (NS_PER_SEC as f64 / rate) as u64;
        self.refresh_timer_id = self.timers.borrow_mut().add_cyclic_timer(period, cb);
    }

    pub fn stop_refresh(&mut self) {
        if self.refresh_timer_id != 0 {
            self.timers.borrow_mut().cancel_timer(self.refresh_timer_id);
            self.refresh_timer_id = 0;
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_timer_id != 0
    }

    /// Convert one frame out of the framebuffer bytes into ARGB.
    pub fn convert_frame(&self, fb: &[u8], out: &mut Vec<u32>) {
        let (w, h) = (self.active_width, self.active_height);
        out.clear();
        out.reserve(w * h);
        for row in 0..h {
            let line = &fb[row * self.fb_pitch..];
            match self.depth {
                PixelDepth::Indexed4 => {
                    for col in 0..w {
                        let byte = line[col / 2];
                        let idx = if col & 1 == 0 { byte >> 4 } else { byte & 0xF };
                        out.push(self.palette[idx as usize]);
                    }
                }
                PixelDepth::Indexed8 => {
                    for col in 0..w {
                        out.push(self.palette[line[col] as usize]);
                    }
                }
                PixelDepth::Rgb555 => {
                    for col in 0..w {
                        let pix = u16::from_be_bytes([line[col * 2], line[col * 2 + 1]]);
                        let r = ((pix >> 10) & 0x1F) as u32;
                        let g = ((pix >> 5) & 0x1F) as u32;
                        let b = (pix & 0x1F) as u32;
                        out.push(
                            0xFF00_0000
                                | ((r << 3 | r >> 2) << 16)
                                | ((g << 3 | g >> 2) << 8)
                                | (b << 3 | b >> 2),
                        );
                    }
                }
                PixelDepth::Rgb888 => {
                    for col in 0..w {
                        let p = &line[col * 3..col * 3 + 3];
                        out.push(0xFF00_0000 | ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32);
                    }
                }
                PixelDepth::Argb32 => {
                    for col in 0..w {
                        let p = &line[col * 4..col * 4 + 4];
                        out.push(0xFF00_0000 | ((p[1] as u32) << 16) | ((p[2] as u32) << 8) | p[3] as u32);
                    }
                }
            }
        }
    }
}

impl Drop for Crtc {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}

// ---------------------------------------------------------------- Control

// Register cells, one per 16-byte stride.
const CTRL_CUR_LINE: u32 = 0x00;
const CTRL_VFP: u32 = 0x02;
const CTRL_VAL: u32 = 0x03;
const CTRL_VHLINE: u32 = 0x07;
const CTRL_HFP: u32 = 0x0A;
const CTRL_HAL: u32 = 0x0B;
const CTRL_HLFLN: u32 = 0x0F;
const CTRL_SWATCH_LAST: u32 = 0x10; // HSERR
const CTRL_CNTTST: u32 = 0x11;
const CTRL_SWATCH_CTRL: u32 = 0x12;
const CTRL_GBASE: u32 = 0x13;
const CTRL_ROW_WORDS: u32 = 0x14;
const CTRL_MON_SENSE: u32 = 0x15;
const CTRL_MISC_ENABLES: u32 = 0x16;
const CTRL_GSC_DIVIDE: u32 = 0x17;
const CTRL_REFRESH_COUNT: u32 = 0x18;
const CTRL_INT_ENABLE: u32 = 0x19;
const CTRL_INT_STATUS: u32 = 0x1A;

// RaDACal window starts past the Swatch cells.
const RADACAL_ADDR: u32 = 0x70;
const RADACAL_LUT: u32 = 0x71;
const RADACAL_CONFIG: u32 = 0x72;

// MISC_ENABLES bits.
const MISC_DISP_ENABLE: u32 = 0x01;
const MISC_BLANK: u32 = 0x400;

// INT_ENABLE bits.
const INT_VBL_ENABLE: u32 = 0x08;
const INT_VBL_CLEAR: u32 = 0x04;

// INT_STATUS bits.
const STAT_VBL: u32 = 0x04;

pub type ControlVideoPtr = Rc<RefCell<ControlVideo>>;

pub struct ControlVideo {
    me: Weak<RefCell<ControlVideo>>,
    pub crtc: Crtc,
    vram: BytesPtr,
    display: DisplayPtr,
    monitor: &'static MonitorInfo,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,

    swatch_params: [u32; 17],
    swatch_ctrl: u32,
    gbase: u32,
    row_words: u32,
    mon_sense: u32,
    misc_enables: u32,
    clock_divisor: u32,
    int_enable: u32,
    int_status: u32,

    dac_addr: u8,
    dac_comp: u8,
    dac_color: [u8; 3],
    dac_config: u32,

    frame: Vec<u32>,
}

impl ControlVideo {
    pub fn new(timers: TimersPtr, vram_size: u32, display: DisplayPtr, monitor: &'static MonitorInfo) -> ControlVideoPtr {
        let vram = Rc::new(RefCell::new(vec![0u8; vram_size as usize]));
        let dev = Rc::new(RefCell::new(ControlVideo {
            me: Weak::new(),
            crtc: Crtc::new(timers),
            vram,
            display,
            monitor,
            int_ctrl: None,
            irq_id: 0,
            swatch_params: [0; 17],
            swatch_ctrl: 0,
            gbase: 0,
            row_words: 0,
            mon_sense: 0,
            misc_enables: 0,
            clock_divisor: 1,
            int_enable: 0,
            int_status: 0,
            dac_addr: 0,
            dac_comp: 0,
            dac_color: [0; 3],
            dac_config: 0,
            frame: Vec::new(),
        }));
        dev.borrow_mut().me = Rc::downgrade(&dev);
        dev
    }

    pub fn vram(&self) -> BytesPtr {
        Rc::clone(&self.vram)
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    fn enable_display(&mut self) {
        let divisor = self.clock_divisor.max(1);
        let hal = self.swatch_params[CTRL_HAL as usize];
        let hfp = self.swatch_params[CTRL_HFP as usize];
        let val = self.swatch_params[CTRL_VAL as usize];
        let vfp = self.swatch_params[CTRL_VFP as usize];
        let hlfln = self.swatch_params[CTRL_HLFLN as usize];
        let vhline = self.swatch_params[CTRL_VHLINE as usize];

        self.crtc.active_width = (hfp.saturating_sub(hal) as usize) * divisor as usize;
        // vertical timing is programmed in half lines
        self.crtc.active_height = vfp.saturating_sub(val) as usize / 2;
        self.crtc.hori_total = hlfln * 2 * divisor;
        self.crtc.vert_total = (vhline + 1) / 2;
        self.crtc.fb_base = self.gbase;
        self.crtc.fb_pitch = self.row_words as usize;
        self.crtc.depth = match self.dac_config & 3 {
            0 => PixelDepth::Indexed8,
            1 => PixelDepth::Rgb555,
            _ => PixelDepth::Argb32,
        };

        let (w, h) = (self.crtc.active_width, self.crtc.active_height);
        self.display.borrow_mut().set_mode(w, h);

        let me = self.me.clone();
        self.crtc.start_refresh(Rc::new(move || {
            if let Some(dev) = me.upgrade() {
                dev.borrow_mut().refresh_frame();
            }
        }));
    }

    fn disable_display(&mut self) {
        self.crtc.stop_refresh();
        info!("Control: display disabled");
    }

    /// Per-frame work: convert the framebuffer for the display, then
    /// raise VBL.
    fn refresh_frame(&mut self) {
        if self.misc_enables & MISC_BLANK == 0 {
            let vram = self.vram.borrow();
            let base = self.crtc.fb_base as usize;
            let mut frame = std::mem::replace(&mut self.frame, Vec::new());
            self.crtc.convert_frame(&vram[base..], &mut frame);
            let (w, h) = (self.crtc.active_width, self.crtc.active_height);
            self.display.borrow_mut().update_frame(&frame, w, h);
            self.frame = frame;
        }
        self.int_status |= STAT_VBL;
        if self.int_enable & INT_VBL_ENABLE != 0 {
            if let Some(ctrl) = &self.int_ctrl {
                ctrl.borrow_mut().ack_int(self.irq_id, 1);
            }
        }
    }

    fn dac_write(&mut self, reg: u32, value: u8) {
        match reg {
            RADACAL_ADDR => {
                self.dac_addr = value;
                self.dac_comp = 0;
            }
            RADACAL_LUT => {
                self.dac_color[self.dac_comp as usize] = value;
                self.dac_comp += 1;
                if self.dac_comp == 3 {
                    self.crtc.palette[self.dac_addr as usize] = 0xFF00_0000
                        | ((self.dac_color[0] as u32) << 16)
                        | ((self.dac_color[1] as u32) << 8)
                        | self.dac_color[2] as u32;
                    self.dac_addr = self.dac_addr.wrapping_add(1);
                    self.dac_comp = 0;
                }
            }
            RADACAL_CONFIG => {
                self.dac_config = value as u32;
                debug!("Control: RaDACal config = 0x{:X}", value);
            }
            _ => {}
        }
    }
}

impl MmioDevice for ControlVideo {
    fn read(&mut self, _rgn_start: u32, offset: u32, _size: Size) -> u32 {
        let reg = offset >> 4;
        match reg {
            CTRL_CUR_LINE => 0, // the guest only polls this for motion
            r if r >= 1 && r <= CTRL_SWATCH_LAST => self.swatch_params[r as usize],
            CTRL_CNTTST => 0,
            CTRL_SWATCH_CTRL => self.swatch_ctrl,
            CTRL_GBASE => self.gbase,
            CTRL_ROW_WORDS => self.row_words,
            CTRL_MON_SENSE => {
                let levels = ((self.mon_sense >> 3) & 7) as u8;
                let dirs = (!self.mon_sense & 7) as u8;
                (self.monitor.read_sense(levels, dirs) as u32) << 6
            }
            CTRL_MISC_ENABLES => self.misc_enables,
            CTRL_GSC_DIVIDE => self.clock_divisor,
            CTRL_REFRESH_COUNT => 0,
            CTRL_INT_ENABLE => self.int_enable,
            CTRL_INT_STATUS => self.int_status,
            RADACAL_ADDR => self.dac_addr as u32,
            RADACAL_CONFIG => self.dac_config,
            _ => {
                warn!("Control: read from unknown register {}", reg);
                0
            }
        }
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, _size: Size) {
        let reg = offset >> 4;
        match reg {
            r if r >= 1 && r <= CTRL_SWATCH_LAST => {
                self.swatch_params[r as usize] = value & 0xFFF;
            }
            CTRL_SWATCH_CTRL => self.swatch_ctrl = value,
            CTRL_GBASE => self.gbase = value & 0x3F_FFE0,
            CTRL_ROW_WORDS => self.row_words = value & 0x7FE0,
            CTRL_MON_SENSE => self.mon_sense = value,
            CTRL_MISC_ENABLES => {
                let old = self.misc_enables;
                self.misc_enables = value;
                if value & MISC_DISP_ENABLE != 0 && old & MISC_DISP_ENABLE == 0 {
                    self.enable_display();
                } else if value & MISC_DISP_ENABLE == 0 && old & MISC_DISP_ENABLE != 0 {
                    self.disable_display();
                }
            }
            CTRL_GSC_DIVIDE => {
                self.clock_divisor = match value & 3 {
                    0 => 1,
                    1 => 2,
                    _ => 4,
                };
            }
            CTRL_INT_ENABLE => {
                self.int_enable = value;
                if value & INT_VBL_CLEAR != 0 {
                    self.int_status &= !STAT_VBL;
                    if let Some(ctrl) = &self.int_ctrl {
                        ctrl.borrow_mut().ack_int(self.irq_id, 0);
                    }
                }
            }
            RADACAL_ADDR | RADACAL_LUT | RADACAL_CONFIG => self.dac_write(reg, value as u8),
            _ => debug!("Control: write 0x{:X} to register {}", value, reg),
        }
    }
}

/// Program the pixel clock straight from the machine preset; on real
/// hardware this is a CUD-programmed clock generator.
impl ControlVideo {
    pub fn set_pixel_clock(&mut self, hz: u32) {
        self.crtc.pixel_clock = hz;
    }
}

// --------------------------------------------------------------- Mach64 GX

// Little-endian dword registers within the 1 KiB block.
const M64_CRTC_H_TOTAL_DISP: u32 = 0x00;
const M64_CRTC_V_TOTAL_DISP: u32 = 0x08;
const M64_CRTC_VLINE_CRNT_VLINE: u32 = 0x10;
const M64_CRTC_OFF_PITCH: u32 = 0x14;
const M64_CRTC_INT_CNTL: u32 = 0x18;
const M64_CRTC_GEN_CNTL: u32 = 0x1C;
const M64_CLOCK_CNTL: u32 = 0x90;
const M64_MEM_CNTL: u32 = 0xB0;
const M64_DAC_REGS: u32 = 0xC0;
const M64_DAC_CNTL: u32 = 0xC4;
const M64_GEN_TEST_CNTL: u32 = 0xD0;
const M64_CONFIG_CHIP_ID: u32 = 0xE0;
const M64_CONFIG_STAT0: u32 = 0xE4;

const M64_CHIP_ID_GX: u32 = 0x0000_00D7; // "GX" ASIC

// CRTC_GEN_CNTL bits.
const M64_CRTC_ENABLE: u32 = 1 << 25;

// CRTC_INT_CNTL bits.
const M64_VBLANK_INT_EN: u32 = 1 << 1;
const M64_VBLANK_INT: u32 = 1 << 2;

pub type AtiMach64Ptr = Rc<RefCell<AtiMach64>>;

pub struct AtiMach64 {
    me: Weak<RefCell<AtiMach64>>,
    pub crtc: Crtc,
    vram: BytesPtr,
    display: DisplayPtr,
    int_ctrl: Option<IntCtrlPtr>,
    irq_id: u64,

    regs_h_total_disp: u32,
    regs_v_total_disp: u32,
    off_pitch: u32,
    int_cntl: u32,
    gen_cntl: u32,
    clock_cntl: u32,
    mem_cntl: u32,
    dac_cntl: u32,
    dac_addr: u8,
    dac_comp: u8,
    dac_color: [u8; 3],

    frame: Vec<u32>,
}

impl AtiMach64 {
    pub fn new(timers: TimersPtr, vram_size: u32, display: DisplayPtr) -> AtiMach64Ptr {
        let vram = Rc::new(RefCell::new(vec![0u8; vram_size as usize]));
        let dev = Rc::new(RefCell::new(AtiMach64 {
            me: Weak::new(),
            crtc: Crtc::new(timers),
            vram,
            display,
            int_ctrl: None,
            irq_id: 0,
            regs_h_total_disp: 0,
            regs_v_total_disp: 0,
            off_pitch: 0,
            int_cntl: 0,
            gen_cntl: 0,
            clock_cntl: 0,
            mem_cntl: 0,
            dac_cntl: 0,
            dac_addr: 0,
            dac_comp: 0,
            dac_color: [0; 3],
            frame: Vec::new(),
        }));
        dev.borrow_mut().me = Rc::downgrade(&dev);
        dev
    }

    pub fn vram(&self) -> BytesPtr {
        Rc::clone(&self.vram)
    }

    pub fn connect_int_ctrl(&mut self, ctrl: IntCtrlPtr, irq_id: u64) {
        self.int_ctrl = Some(ctrl);
        self.irq_id = irq_id;
    }

    pub fn set_pixel_clock(&mut self, hz: u32) {
        self.crtc.pixel_clock = hz;
    }

    fn crtc_update(&mut self) {
        let enable = self.gen_cntl & M64_CRTC_ENABLE != 0;
        if !enable {
            self.crtc.stop_refresh();
            return;
        }
        // horizontal values are in character (8-pixel) units
        let h_total = (self.regs_h_total_disp & 0x1FF) * 8;
        let h_disp = (((self.regs_h_total_disp >> 16) & 0xFF) + 1) * 8;
        let v_total = (self.regs_v_total_disp & 0x7FF) + 1;
        let v_disp = ((self.regs_v_total_disp >> 16) & 0x7FF) + 1;

        self.crtc.active_width = h_disp as usize;
        self.crtc.active_height = v_disp as usize;
        self.crtc.hori_total = h_total.max(h_disp);
        self.crtc.vert_total = v_total.max(v_disp);
        self.crtc.fb_base = (self.off_pitch & 0xFFFFF) * 8;
        let pitch_pix = ((self.off_pitch >> 22) & 0x3FF) * 8;
        self.crtc.depth = match (self.gen_cntl >> 8) & 7 {
            2 => PixelDepth::Indexed8,
            3 => PixelDepth::Rgb555,
            5 => PixelDepth::Rgb888,
            6 => PixelDepth::Argb32,
            _ => PixelDepth::Indexed8,
        };
        self.crtc.fb_pitch = pitch_pix as usize * self.crtc.depth.bits() / 8;

        let (w, h) = (self.crtc.active_width, self.crtc.active_height);
        self.display.borrow_mut().set_mode(w, h);

        let me = self.me.clone();
        self.crtc.start_refresh(Rc::new(move || {
            if let Some(dev) = me.upgrade() {
                dev.borrow_mut().refresh_frame();
            }
        }));
    }

    fn refresh_frame(&mut self) {
        let vram = self.vram.borrow();
        let base = self.crtc.fb_base as usize;
        let mut frame = std::mem::replace(&mut self.frame, Vec::new());
        self.crtc.convert_frame(&vram[base..], &mut frame);
        let (w, h) = (self.crtc.active_width, self.crtc.active_height);
        self.display.borrow_mut().update_frame(&frame, w, h);
        self.frame = frame;
        drop(vram);

        self.int_cntl |= M64_VBLANK_INT;
        if self.int_cntl & M64_VBLANK_INT_EN != 0 {
            if let Some(ctrl) = &self.int_ctrl {
                ctrl.borrow_mut().ack_int(self.irq_id, 1);
                ctrl.borrow_mut().ack_int(self.irq_id, 0);
            }
        }
    }
}

impl MmioDevice for AtiMach64 {
    fn read(&mut self, _rgn_start: u32, offset: u32, _size: Size) -> u32 {
        let value = match offset & !3 {
            M64_CRTC_H_TOTAL_DISP => self.regs_h_total_disp,
            M64_CRTC_V_TOTAL_DISP => self.regs_v_total_disp,
            M64_CRTC_VLINE_CRNT_VLINE => 0,
            M64_CRTC_OFF_PITCH => self.off_pitch,
            M64_CRTC_INT_CNTL => self.int_cntl,
            M64_CRTC_GEN_CNTL => self.gen_cntl,
            M64_CLOCK_CNTL => self.clock_cntl,
            M64_MEM_CNTL => self.mem_cntl,
            M64_DAC_REGS => self.dac_addr as u32,
            M64_DAC_CNTL => self.dac_cntl,
            M64_GEN_TEST_CNTL => 0,
            M64_CONFIG_CHIP_ID => M64_CHIP_ID_GX,
            M64_CONFIG_STAT0 => 0,
            _ => {
                debug!("Mach64: read from unknown register 0x{:X}", offset);
                0
            }
        };
        value.swap_bytes() // registers are little-endian on the PCI bus
    }

    fn write(&mut self, _rgn_start: u32, offset: u32, value: u32, _size: Size) {
        let value = value.swap_bytes();
        match offset & !3 {
            M64_CRTC_H_TOTAL_DISP => {
                self.regs_h_total_disp = value;
                self.crtc_update();
            }
            M64_CRTC_V_TOTAL_DISP => {
                self.regs_v_total_disp = value;
                self.crtc_update();
            }
            M64_CRTC_OFF_PITCH => {
                self.off_pitch = value;
                self.crtc_update();
            }
            M64_CRTC_INT_CNTL => {
                // acknowledge by writing the flag bit back
                if value & M64_VBLANK_INT != 0 {
                    self.int_cntl &= !M64_VBLANK_INT;
                }
                self.int_cntl = (self.int_cntl & M64_VBLANK_INT) | (value & !M64_VBLANK_INT);
            }
            M64_CRTC_GEN_CNTL => {
                self.gen_cntl = value;
                self.crtc_update();
            }
            M64_CLOCK_CNTL => self.clock_cntl = value,
            M64_MEM_CNTL => self.mem_cntl = value,
            M64_DAC_REGS => {
                match offset & 3 {
                    0 => {
                        self.dac_addr = value as u8;
                        self.dac_comp = 0;
                    }
                    1 => {
                        self.dac_color[self.dac_comp as usize] = value as u8;
                        self.dac_comp += 1;
                        if self.dac_comp == 3 {
                            self.crtc.palette[self.dac_addr as usize] = 0xFF00_0000
                                | ((self.dac_color[0] as u32) << 16)
                                | ((self.dac_color[1] as u32) << 8)
                                | self.dac_color[2] as u32;
                            self.dac_addr = self.dac_addr.wrapping_add(1);
                            self.dac_comp = 0;
                        }
                    }
                    _ => {}
                }
            }
            M64_DAC_CNTL => self.dac_cntl = value,
            _ => debug!("Mach64: write 0x{:X} to unknown register 0x{:X}", value, offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timers::TimerManager;

    fn test_crtc() -> Crtc {
        Crtc::new(Rc::new(RefCell::new(TimerManager::new())))
    }

    #[test]
    fn refresh_rate_follows_totals() {
        let mut crtc = test_crtc();
        crtc.pixel_clock = 25_175_000;
        crtc.hori_total = 800;
        crtc.vert_total = 525;
        let rate = crtc.refresh_rate();
        assert!((rate - 59.94).abs() < 0.05);
    }

    #[test]
    fn convert_8bpp_uses_palette() {
        let mut crtc = test_crtc();
        crtc.active_width = 4;
        crtc.active_height = 1;
        crtc.fb_pitch = 4;
        crtc.depth = PixelDepth::Indexed8;
        crtc.palette[1] = 0xFFFF_0000;
        crtc.palette[2] = 0xFF00_FF00;
        let fb = [1u8, 2, 1, 0];
        let mut out = Vec::new();
        crtc.convert_frame(&fb, &mut out);
        assert_eq!(out, vec![0xFFFF_0000, 0xFF00_FF00, 0xFFFF_0000, 0xFF00_0000]);
    }

    #[test]
    fn convert_15bpp_expands_channels() {
        let mut crtc = test_crtc();
        crtc.active_width = 1;
        crtc.active_height = 1;
        crtc.fb_pitch = 2;
        crtc.depth = PixelDepth::Rgb555;
        // pure red: 0x7C00 big-endian
        let fb = [0x7C, 0x00];
        let mut out = Vec::new();
        crtc.convert_frame(&fb, &mut out);
        assert_eq!(out, vec![0xFFFF_0000]);
    }

    #[test]
    fn extended_sense_groups() {
        let mon = monitor_by_name("Multiscan17in"); // ext 0x0B = 00 10 11
        assert_eq!(mon.read_sense(0, 0), 7);
        assert_eq!(mon.read_sense(0b100, 0b100), 0b100); // group 00
        assert_eq!(mon.read_sense(0b010, 0b010), 0b110); // group 10 -> pins 2,0
        assert_eq!(mon.read_sense(0b001, 0b001), 0b111); // group 11 -> pins 2,1
    }
}
