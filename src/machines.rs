// Concrete machine presets, built the way the boards were: leaves first,
// then the I/O controller that owns them, then the post-init pass that
// resolves interrupt and DMA cross-references through the registry.

use crate::adb::{AdbKeyboard, AdbMouse};
use crate::amic::Amic;
use crate::awacs::{AudioOut, AwacsScreamer};
use crate::dbdma::DmaChannel;
use crate::escc::{backend_for_tag, EsccController};
use crate::ethernet::{BigMac, Mace};
use crate::fields::Size;
use crate::interrupts::{IntSrc, InterruptCtrl};
use crate::machine::{DeviceObj, Machine, MachineSettings, Property};
use crate::macio::{
    BoardRegister, GrandCentral, MacIoIntCtrl, MacIoKind, MacIoTwo, NvramAddrHiDev, NvramDev,
};
use crate::macio::{GC_DMA_AUDIO_OUT, GC_DMA_ESCC_A_RCV, GC_DMA_ESCC_A_XMIT, GC_DMA_ESCC_B_RCV,
    GC_DMA_ESCC_B_XMIT, GC_DMA_FLOPPY, GC_DMA_SCSI_CURIO, GC_DMA_SCSI_MESH};
use crate::macio::{MIO2_DMA_AUDIO_OUT, MIO2_DMA_ESCC_A_RCV, MIO2_DMA_ESCC_A_XMIT,
    MIO2_DMA_ESCC_B_RCV, MIO2_DMA_ESCC_B_XMIT, MIO2_DMA_ETH_RCV, MIO2_DMA_ETH_XMIT,
    MIO2_DMA_FLOPPY, MIO2_DMA_MESH};
use crate::memctrl::{GrackleConfigAddr, GrackleConfigData, HammerheadCtrl, HmcCtrl, Mpc106};
use crate::memory::MmioDevice;
use crate::nvram::{NVram, OfConfigAppl, OfConfigChrp};
use crate::scsi::{MeshController, Sc53C94, ScsiBus};
use crate::swim3::Swim3Ctrl;
use crate::video::{monitor_by_name, AtiMach64, ControlVideo, DisplayPtr};
use crate::viacuda::ViaCuda;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::cell::RefCell;
use std::rc::Rc;

const MAC_ADDRESS: [u8; 6] = [0x08, 0x00, 0x07, 0x44, 0x55, 0x66];

pub struct MachineDescription {
    pub name: &'static str,
    pub description: &'static str,
    pub create: fn(&MachineSettings, DisplayPtr, Box<dyn AudioOut>) -> Result<Machine>,
}

pub static MACHINES: &[MachineDescription] = &[
    MachineDescription {
        name: "pmac6100",
        description: "Power Macintosh 6100 (PDM, AMIC I/O)",
        create: create_pmac6100,
    },
    MachineDescription {
        name: "pmac7500",
        description: "Power Macintosh 7500 (TNT, Grand Central I/O)",
        create: create_pmac7500,
    },
    MachineDescription {
        name: "pmacg3",
        description: "Power Macintosh G3 Beige (Gossamer, Grackle + Heathrow)",
        create: create_pmacg3,
    },
];

/// Default property set shared by all machines; presets tighten the
/// allowed values where the board constrains them.
pub fn default_settings() -> MachineSettings {
    let mut s = MachineSettings::new();
    for bank in 0..13 {
        let key = format!("rambank{}_size", bank);
        s.define(&key, Property::Int { value: 0, min: 0, max: 512 });
    }
    s.define("gfxmem_size", Property::Int { value: 2, min: 1, max: 4 });
    s.define_str("mon_id", "HiRes12-14in", &[]);
    s.define_str("cpu", "PPC_601", &["PPC_601", "PPC_603", "PPC_604", "PPC_MPC750"]);
    s.define_str("adb_devices", "keyboard,mouse", &[]);
    s.define_bin("emmo", false);
    s.define_str("pci_A1", "", &[]);
    s.define_str("pci_B1", "", &[]);
    s.define_str("pci_C1", "", &[]);
    s.define_str("pci_GPU", "", &[]);
    s.define_str("cdr_config", "", &[]);
    s.define_str("hdd_img", "", &[]);
    s.define_str("fdd_img", "", &[]);
    s.define_str("cdr_img", "", &[]);
    s.define_str("serial_backend", "void", &["void", "loopback"]);
    s
}

pub fn create_machine(
    name: &str,
    overrides: &[(String, String)],
    display: DisplayPtr,
    audio: Box<dyn AudioOut>,
) -> Result<Machine> {
    let desc = MACHINES
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| anyhow!("unknown machine '{}'", name))?;
    let mut settings = default_settings();
    for (key, value) in overrides {
        settings.set(key, value)?;
    }
    (desc.create)(&settings, display, audio)
}

fn pvr_for_cpu(tag: &str) -> u32 {
    match tag {
        "PPC_601" => 0x0001_0001,
        "PPC_603" => 0x0003_0001,
        "PPC_604" => 0x0004_0103,
        "PPC_MPC750" => 0x0008_0200,
        other => panic!("Unsupported CPU type '{}'!", other),
    }
}

fn note_media_settings(settings: &MachineSettings) {
    // image handling lives in the host frontend; record the request
    for key in ["hdd_img", "fdd_img", "cdr_img"].iter() {
        let path = settings.get_str(key);
        if !path.is_empty() {
            info!("{} = '{}' (media handled by the frontend)", key, path);
        }
    }
    let cdr = settings.get_str("cdr_config");
    if !cdr.is_empty() {
        info!("cdr_config = '{}'", cdr);
    }
}

/// Attach ADB input devices per the adb_devices list and hook them to the
/// host event streams.
fn attach_adb_devices(machine: &Machine, settings: &MachineSettings) {
    for tag in settings.get_str("adb_devices").split(',') {
        match tag.trim() {
            "keyboard" => {
                let kbd = AdbKeyboard::new();
                machine.adb_bus.borrow_mut().attach(kbd.clone());
                let sink = kbd.clone();
                machine.event_mgr.borrow_mut().add_kbd_listener(Rc::new(move |ev| {
                    sink.borrow_mut().key_event(ev.code, ev.pressed);
                }));
            }
            "mouse" => {
                let mouse = AdbMouse::new();
                machine.adb_bus.borrow_mut().attach(mouse.clone());
                let sink = mouse.clone();
                machine.event_mgr.borrow_mut().add_mouse_listener(Rc::new(move |ev| {
                    sink.borrow_mut().mouse_event(ev.dx, ev.dy, ev.button);
                }));
            }
            "" => {}
            other => warn!("Ignoring unknown ADB device '{}'", other),
        }
    }
}

fn hook_cuda_autopoll(machine: &Machine) {
    let cuda = machine.via_cuda().expect("Machine has no Cuda!");
    machine.event_mgr.borrow_mut().add_post_handler(Rc::new(move || {
        cuda.borrow_mut().autopoll_handler();
    }));
}

fn hook_escc_polling(machine: &Machine, escc: &crate::escc::EsccPtr) {
    let escc = Rc::clone(escc);
    machine.event_mgr.borrow_mut().add_post_handler(Rc::new(move || {
        escc.borrow_mut().poll_backends();
    }));
}

/// A one-slot identity register (CPU id / machine id probes).
struct MachineId {
    value: u32,
}

impl MmioDevice for MachineId {
    fn read(&mut self, _rgn_start: u32, _offset: u32, size: Size) -> u32 {
        self.value & size.mask()
    }
    fn write(&mut self, _rgn_start: u32, _offset: u32, _value: u32, _size: Size) {}
}

// ------------------------------------------------------------- PDM 6100

fn create_pmac6100(settings: &MachineSettings, display: DisplayPtr, audio: Box<dyn AudioOut>) -> Result<Machine> {
    let _ = display; // PDM built-in video is register-level only
    let mut machine = Machine::new("pmac6100");
    machine.pvr = pvr_for_cpu(&settings.get_str("cpu"));
    note_media_settings(settings);

    // memory: 8 MB soldered plus up to two SIMM banks
    let onboard = 8u32 << 20;
    let bank1 = settings.get_int("rambank1_size") << 20;
    let bank2 = settings.get_int("rambank2_size") << 20;
    {
        let mut map = machine.map.borrow_mut();
        map.add_ram_region(0x0000_0000, onboard + bank1 + bank2);
        let rom = map.add_rom_region(0xFFC0_0000, 0x40_0000);
        map.add_mirror_region(0x4000_0000, 0x40_0000, 0xFFC0_0000);
        machine.rom = Some(rom);
    }

    // leaves
    let scsi_bus = ScsiBus::new();
    let curio = Sc53C94::new(Rc::clone(&scsi_bus));
    let backend = settings.get_str("serial_backend");
    let escc = EsccController::new(backend_for_tag(&backend), backend_for_tag(&backend));
    let mace = Mace::new(MAC_ADDRESS);
    let swim3 = Swim3Ctrl::new(Rc::clone(&machine.timers));
    let awacs = AwacsScreamer::new(Rc::clone(&machine.timers), audio);
    let cuda = ViaCuda::new(Rc::clone(&machine.timers), Rc::clone(&machine.adb_bus), machine.power.clone());
    let monitor = monitor_by_name(&settings.get_str("mon_id"));

    // the I/O controller that owns them
    let amic = Amic::new(
        Rc::clone(&machine.timers),
        machine.int_pin.clone(),
        cuda.clone(),
        escc.clone(),
        mace.clone(),
        curio.clone(),
        swim3.clone(),
        awacs.clone(),
        monitor,
        settings.get_bin("emmo"),
    );
    let int_ctrl = amic.borrow().int_ctrl.clone();
    machine.int_ctrl = Some(int_ctrl.clone());

    {
        let mut map = machine.map.borrow_mut();
        map.add_mmio_region(0x50F0_0000, 0x4_0000, amic.clone());
        map.add_mmio_region(0x50F4_0000, 0x1_0000, HmcCtrl::new());
        map.add_mmio_region(
            0x5FFF_FFFC,
            4,
            Rc::new(RefCell::new(MachineId { value: 0x3010 })),
        );
    }

    // post-init: interrupt wiring and periodic machinery
    let cuda_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ViaCuda);
    cuda.borrow_mut().connect_int_ctrl(int_ctrl.clone(), cuda_irq);
    escc.borrow_mut().connect_int_ctrl(int_ctrl.clone());
    let scsi_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ScsiCurio);
    curio.borrow_mut().connect_int_ctrl(int_ctrl.clone(), scsi_irq);
    let swim_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::Swim3);
    swim3.borrow_mut().connect_int_ctrl(int_ctrl.clone(), swim_irq);
    amic.borrow_mut().start_pseudo_vbl();

    attach_adb_devices(&machine, settings);
    machine.add_device("amic", DeviceObj::Mmio(amic));
    machine.add_device("amic_ints", DeviceObj::IntCtrl(int_ctrl));
    machine.add_device("viacuda", DeviceObj::Via(cuda));
    hook_cuda_autopoll(&machine);
    hook_escc_polling(&machine, &escc);

    Ok(machine)
}

// -------------------------------------------------------------- TNT 7500

fn create_pmac7500(settings: &MachineSettings, display: DisplayPtr, audio: Box<dyn AudioOut>) -> Result<Machine> {
    let mut machine = Machine::new("pmac7500");
    machine.pvr = pvr_for_cpu(&settings.get_str("cpu"));
    note_media_settings(settings);

    // memory sits behind Hammerhead: bank 0 is the motherboard pair
    let hammerhead = HammerheadCtrl::new();
    let mut any_ram = false;
    for bank in 0..13 {
        let key = format!("rambank{}_size", bank);
        let size = settings.get_int(&key) << 20;
        if size != 0 {
            hammerhead.borrow_mut().insert_ram_dimm(bank as usize, size);
            any_ram = true;
        }
    }
    if !any_ram {
        hammerhead.borrow_mut().insert_ram_dimm(0, 16 << 20);
    }
    let ram_total = hammerhead.borrow_mut().map_phys_ram();
    {
        let mut map = machine.map.borrow_mut();
        map.add_ram_region(0x0000_0000, ram_total);
        let rom = map.add_rom_region(0xFFC0_0000, 0x40_0000);
        map.add_mirror_region(0x4000_0000, 0x40_0000, 0xFFC0_0000);
        map.add_mmio_region(0xF800_0000, 0x800, hammerhead.clone());
        machine.rom = Some(rom);
    }

    // leaves
    let scsi_bus = ScsiBus::new();
    let curio = Sc53C94::new(Rc::clone(&scsi_bus));
    let mesh = MeshController::new(Rc::clone(&scsi_bus));
    let backend = settings.get_str("serial_backend");
    let escc = EsccController::new(backend_for_tag(&backend), backend_for_tag(&backend));
    let mace = Mace::new(MAC_ADDRESS);
    let swim3 = Swim3Ctrl::new(Rc::clone(&machine.timers));
    let awacs = AwacsScreamer::new(Rc::clone(&machine.timers), audio);
    let cuda = ViaCuda::new(Rc::clone(&machine.timers), Rc::clone(&machine.adb_bus), machine.power.clone());

    let int_ctrl = MacIoIntCtrl::new(MacIoKind::GrandCentral, machine.int_pin.clone());
    machine.int_ctrl = Some(int_ctrl.clone());

    let gc = GrandCentral::new(
        int_ctrl.clone(),
        curio.clone(),
        Some(mesh.clone()),
        mace.clone(),
        escc.clone(),
        awacs.clone(),
        swim3.clone(),
        cuda.clone(),
        MAC_ADDRESS,
    );

    // IOBus peripherals: board register, NVRAM latch pair
    let nvram = NVram::new_shared(8192);
    machine.nvram = Some(Rc::clone(&nvram));
    let addr_hi = NvramAddrHiDev::new();
    {
        let mut gc_mut = gc.borrow_mut();
        gc_mut.attach_iodevice(0, BoardRegister::new(0x3D8C));
        gc_mut.attach_iodevice(3, addr_hi.clone());
        gc_mut.attach_iodevice(5, NvramDev::new(Rc::clone(&nvram), addr_hi));
    }
    OfConfigAppl::new(Rc::clone(&nvram)).init_partition();

    // DBDMA channels
    let dma_specs: &[(&str, u32, IntSrc)] = &[
        ("dma_scsi_curio", GC_DMA_SCSI_CURIO, IntSrc::DmaScsiCurio),
        ("dma_floppy", GC_DMA_FLOPPY, IntSrc::DmaSwim3),
        ("dma_escc_a_tx", GC_DMA_ESCC_A_XMIT, IntSrc::DmaSccaTx),
        ("dma_escc_a_rx", GC_DMA_ESCC_A_RCV, IntSrc::DmaSccaRx),
        ("dma_escc_b_tx", GC_DMA_ESCC_B_XMIT, IntSrc::DmaSccbTx),
        ("dma_escc_b_rx", GC_DMA_ESCC_B_RCV, IntSrc::DmaSccbRx),
        ("dma_audio_out", GC_DMA_AUDIO_OUT, IntSrc::DmaDavbusTx),
        ("dma_scsi_mesh", GC_DMA_SCSI_MESH, IntSrc::DmaScsiMesh),
    ];
    for (name, number, src) in dma_specs {
        let ch = DmaChannel::new(name, Rc::clone(&machine.map));
        let irq = int_ctrl.borrow_mut().register_dma_int(*src);
        ch.borrow_mut().register_dma_int(int_ctrl.clone(), irq);
        gc.borrow_mut().set_dma_channel(*number, ch.clone());
        machine.add_device(name, DeviceObj::Dma(ch));
    }
    machine
        .dma_channel("dma_scsi_curio")
        .unwrap()
        .borrow_mut()
        .connect_device(curio.clone(), true);
    machine
        .dma_channel("dma_scsi_mesh")
        .unwrap()
        .borrow_mut()
        .connect_device(mesh.clone(), true);
    {
        let escc_ref = escc.borrow();
        machine
            .dma_channel("dma_escc_a_tx")
            .unwrap()
            .borrow_mut()
            .connect_device(escc_ref.ch_a.clone(), true);
        machine
            .dma_channel("dma_escc_b_tx")
            .unwrap()
            .borrow_mut()
            .connect_device(escc_ref.ch_b.clone(), true);
    }
    awacs
        .borrow_mut()
        .connect_dma_out(machine.dma_channel("dma_audio_out").unwrap());

    // built-in Control video
    let monitor = monitor_by_name(&settings.get_str("mon_id"));
    let gfx_mb = settings.get_int("gfxmem_size");
    let control = ControlVideo::new(Rc::clone(&machine.timers), gfx_mb << 20, display, monitor);
    control.borrow_mut().set_pixel_clock(25_175_000);
    let vbl_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ControlVideo);
    control.borrow_mut().connect_int_ctrl(int_ctrl.clone(), vbl_irq);

    {
        let mut map = machine.map.borrow_mut();
        map.add_mmio_region(0xF300_0000, 0x2_0000, gc.clone());
        map.add_mmio_region(0xF30A_0000, 0x1000, control.clone());
        let vram = control.borrow().vram();
        map.add_ram_alias(0xF100_0000, gfx_mb << 20, vram);
    }

    // post-init interrupt wiring
    let cuda_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ViaCuda);
    cuda.borrow_mut().connect_int_ctrl(int_ctrl.clone(), cuda_irq);
    escc.borrow_mut().connect_int_ctrl(int_ctrl.clone());
    let curio_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ScsiCurio);
    curio.borrow_mut().connect_int_ctrl(int_ctrl.clone(), curio_irq);
    let mesh_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ScsiMesh);
    mesh.borrow_mut().connect_int_ctrl(int_ctrl.clone(), mesh_irq);
    let swim_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::Swim3);
    swim3.borrow_mut().connect_int_ctrl(int_ctrl.clone(), swim_irq);

    attach_adb_devices(&machine, settings);
    machine.add_device("grand_central", DeviceObj::Mmio(gc));
    machine.add_device("control_video", DeviceObj::Mmio(control));
    machine.add_device("viacuda", DeviceObj::Via(cuda));
    hook_cuda_autopoll(&machine);
    hook_escc_polling(&machine, &escc);

    Ok(machine)
}

// --------------------------------------------------------- Gossamer G3

fn create_pmacg3(settings: &MachineSettings, display: DisplayPtr, audio: Box<dyn AudioOut>) -> Result<Machine> {
    let mut machine = Machine::new("pmacg3");
    machine.pvr = pvr_for_cpu(&settings.get_str("cpu"));
    note_media_settings(settings);

    // Grackle owns the RAM banks; the documented registers define the map
    let grackle = Mpc106::new();
    let mut bank_sizes = [0u32; 8];
    let mut any_ram = false;
    for bank in 0..8 {
        let key = format!("rambank{}_size", bank);
        let size = settings.get_int(&key) << 20;
        bank_sizes[bank as usize] = size;
        if size != 0 {
            any_ram = true;
        }
    }
    if !any_ram {
        bank_sizes[0] = 64 << 20;
    }
    grackle.borrow_mut().set_ram_banks(&bank_sizes);
    {
        let mut map = machine.map.borrow_mut();
        for (start, size) in grackle.borrow().ram_banks() {
            map.add_ram_region(start, size);
        }
        let rom = map.add_rom_region(0xFFC0_0000, 0x40_0000);
        map.add_mirror_region(0x4000_0000, 0x40_0000, 0xFFC0_0000);
        map.add_mmio_region(
            0xFEC0_0000,
            0x20_0000,
            Rc::new(RefCell::new(GrackleConfigAddr { bridge: Rc::clone(&grackle) })),
        );
        map.add_mmio_region(
            0xFEE0_0000,
            0x10_0000,
            Rc::new(RefCell::new(GrackleConfigData { bridge: Rc::clone(&grackle) })),
        );
        machine.rom = Some(rom);
    }

    // leaves
    let scsi_bus = ScsiBus::new();
    let mesh = MeshController::new(Rc::clone(&scsi_bus));
    let backend = settings.get_str("serial_backend");
    let escc = EsccController::new(backend_for_tag(&backend), backend_for_tag(&backend));
    let bmac = BigMac::new(MAC_ADDRESS);
    let swim3 = Swim3Ctrl::new(Rc::clone(&machine.timers));
    let awacs = AwacsScreamer::new(Rc::clone(&machine.timers), audio);
    let cuda = ViaCuda::new(Rc::clone(&machine.timers), Rc::clone(&machine.adb_bus), machine.power.clone());
    let nvram = NVram::new_shared(8192);
    machine.nvram = Some(Rc::clone(&nvram));
    OfConfigChrp::new(Rc::clone(&nvram)).init_partition();

    let int_ctrl = MacIoIntCtrl::new(MacIoKind::Heathrow, machine.int_pin.clone());
    machine.int_ctrl = Some(int_ctrl.clone());

    let heathrow = MacIoTwo::new(
        MacIoKind::Heathrow,
        int_ctrl.clone(),
        Some(mesh.clone()),
        Some(bmac.clone()),
        escc.clone(),
        awacs.clone(),
        swim3.clone(),
        cuda.clone(),
        Rc::clone(&nvram),
        settings.get_bin("emmo"),
    );

    // DBDMA channels
    let dma_specs: &[(&str, u32, IntSrc)] = &[
        ("dma_scsi_mesh", MIO2_DMA_MESH, IntSrc::DmaScsiMesh),
        ("dma_floppy", MIO2_DMA_FLOPPY, IntSrc::DmaSwim3),
        ("dma_eth_tx", MIO2_DMA_ETH_XMIT, IntSrc::DmaEthernetTx),
        ("dma_eth_rx", MIO2_DMA_ETH_RCV, IntSrc::DmaEthernetRx),
        ("dma_escc_a_tx", MIO2_DMA_ESCC_A_XMIT, IntSrc::DmaSccaTx),
        ("dma_escc_a_rx", MIO2_DMA_ESCC_A_RCV, IntSrc::DmaSccaRx),
        ("dma_escc_b_tx", MIO2_DMA_ESCC_B_XMIT, IntSrc::DmaSccbTx),
        ("dma_escc_b_rx", MIO2_DMA_ESCC_B_RCV, IntSrc::DmaSccbRx),
        ("dma_audio_out", MIO2_DMA_AUDIO_OUT, IntSrc::DmaDavbusTx),
    ];
    for (name, number, src) in dma_specs {
        let ch = DmaChannel::new(name, Rc::clone(&machine.map));
        let irq = int_ctrl.borrow_mut().register_dma_int(*src);
        ch.borrow_mut().register_dma_int(int_ctrl.clone(), irq);
        heathrow.borrow_mut().set_dma_channel(*number, ch.clone());
        machine.add_device(name, DeviceObj::Dma(ch));
    }
    machine
        .dma_channel("dma_scsi_mesh")
        .unwrap()
        .borrow_mut()
        .connect_device(mesh.clone(), true);
    {
        let escc_ref = escc.borrow();
        machine
            .dma_channel("dma_escc_a_tx")
            .unwrap()
            .borrow_mut()
            .connect_device(escc_ref.ch_a.clone(), true);
        machine
            .dma_channel("dma_escc_b_tx")
            .unwrap()
            .borrow_mut()
            .connect_device(escc_ref.ch_b.clone(), true);
    }
    awacs
        .borrow_mut()
        .connect_dma_out(machine.dma_channel("dma_audio_out").unwrap());

    // the GPU slot carries an ATI Mach64
    let gfx_mb = settings.get_int("gfxmem_size");
    let ati = AtiMach64::new(Rc::clone(&machine.timers), gfx_mb << 20, display);
    ati.borrow_mut().set_pixel_clock(25_175_000);
    let gpu_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::Bandit1);
    ati.borrow_mut().connect_int_ctrl(int_ctrl.clone(), gpu_irq);

    {
        let mut map = machine.map.borrow_mut();
        map.add_mmio_region(0xF300_0000, 0x8_0000, heathrow.clone());
        map.add_mmio_region(0x8100_0000, 0x1000, ati.clone());
        let vram = ati.borrow().vram();
        map.add_ram_alias(0x8180_0000, gfx_mb << 20, vram);
    }

    // post-init interrupt wiring
    let cuda_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ViaCuda);
    cuda.borrow_mut().connect_int_ctrl(int_ctrl.clone(), cuda_irq);
    escc.borrow_mut().connect_int_ctrl(int_ctrl.clone());
    let mesh_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::ScsiMesh);
    mesh.borrow_mut().connect_int_ctrl(int_ctrl.clone(), mesh_irq);
    let swim_irq = int_ctrl.borrow_mut().register_dev_int(IntSrc::Swim3);
    swim3.borrow_mut().connect_int_ctrl(int_ctrl.clone(), swim_irq);

    attach_adb_devices(&machine, settings);
    machine.add_device("heathrow", DeviceObj::Mmio(heathrow));
    machine.add_device("ati_mach64", DeviceObj::Mmio(ati));
    machine.add_device("viacuda", DeviceObj::Via(cuda));
    hook_cuda_autopoll(&machine);
    hook_escc_polling(&machine, &escc);

    Ok(machine)
}
