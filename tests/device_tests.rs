// Device-level tests: Cuda packet round trips, VIA timers, the interrupt
// controllers' latching behavior, the DBDMA descriptor engine, and the
// machine factory itself.

use emppc::adb::AdbKeyboard;
use emppc::awacs::NullAudioOut;
use emppc::dbdma::{make_descriptor, DmaChannel, DmaDevice, CMD_OUTPUT_LAST, CMD_STOP};
use emppc::fields::Size;
use emppc::interrupts::{IntPin, IntSrc, InterruptCtrl};
use emppc::machines::create_machine;
use emppc::macio::{MacIoIntCtrl, MacIoKind};
use emppc::memory::AddressMap;
use emppc::timers::run_due;
use emppc::video::NullDisplay;
use emppc::viacuda::{VIA_ACR, VIA_DIRB, VIA_IER, VIA_IFR, VIA_SR, VIA_B, VIA_T1CH, VIA_T1CL};
use std::cell::RefCell;
use std::rc::Rc;

fn pmac7500() -> emppc::machine::Machine {
    create_machine("pmac7500", &[], Rc::new(RefCell::new(NullDisplay)), Box::new(NullAudioOut))
        .expect("machine creation failed")
}

// ------------------------------------------------------------------- Cuda

// Drive the TIP/BYTEACK handshake the way the guest driver would.
struct CudaLink {
    machine: emppc::machine::Machine,
}

impl CudaLink {
    fn new() -> Self {
        let machine = pmac7500();
        machine.timers.borrow_mut().set_deterministic(true);
        let link = CudaLink { machine };
        let cuda = link.machine.via_cuda().unwrap();
        let mut cuda = cuda.borrow_mut();
        cuda.write(VIA_DIRB, 0x30); // TIP and BYTEACK are outputs
        drop(cuda);
        link
    }

    fn send_packet(&self, bytes: &[u8]) {
        let cuda = self.machine.via_cuda().unwrap();
        let mut cuda = cuda.borrow_mut();
        cuda.write(VIA_ACR, 0x10); // shift register outputs to Cuda
        let mut byteack = 0u8;
        for (i, &b) in bytes.iter().enumerate() {
            cuda.write(VIA_SR, b);
            if i == 0 {
                cuda.write(VIA_B, 0x00); // TIP low starts the transfer
            } else {
                byteack ^= 0x10;
                cuda.write(VIA_B, byteack);
            }
        }
        cuda.write(VIA_B, 0x30); // TIP high ends the packet
        drop(cuda);
        run_due(&self.machine.timers);
    }

    fn read_response(&self, len: usize) -> Vec<u8> {
        let cuda = self.machine.via_cuda().unwrap();
        let mut cuda = cuda.borrow_mut();
        cuda.write(VIA_ACR, 0x00); // shift register inputs from Cuda
        let mut out = Vec::new();
        let mut byteack = 0x10u8;
        cuda.write(VIA_B, byteack); // TIP low opens the response
        out.push(cuda.read(VIA_SR));
        for _ in 1..len {
            byteack ^= 0x10;
            cuda.write(VIA_B, byteack);
            out.push(cuda.read(VIA_SR));
        }
        cuda.write(VIA_B, 0x30);
        out
    }
}

#[test]
fn cuda_get_real_time_is_deterministic() {
    let link = CudaLink::new();
    link.send_packet(&[0x01, 0x03]); // PSEUDO, GET_REAL_TIME
    let response = link.read_response(7);
    // seconds from 1904-01-01 to the pinned 2001-03-24 12:00:00 UTC
    assert_eq!(response, vec![0x01, 0x00, 0x03, 0xB6, 0xE2, 0x3C, 0xC0]);
}

#[test]
fn cuda_pram_write_read_round_trip() {
    let link = CudaLink::new();
    // WRITE_PRAM at 0x20: two payload bytes
    link.send_packet(&[0x01, 0x0C, 0x00, 0x20, 0xAA, 0x55]);
    let _ = link.read_response(3);
    // READ_PRAM from 0x20 is open ended; header + two bytes
    link.send_packet(&[0x01, 0x07, 0x00, 0x20]);
    let response = link.read_response(5);
    assert_eq!(&response[..3], &[0x01, 0x00, 0x07]);
    assert_eq!(&response[3..], &[0xAA, 0x55]);
}

#[test]
fn cuda_unknown_pseudo_command_errors() {
    let link = CudaLink::new();
    link.send_packet(&[0x01, 0x7E]);
    let response = link.read_response(4);
    assert_eq!(response[0], 0x05); // ERROR packet
    assert_eq!(response[1], 2); // bad command
    assert_eq!(response[2], 0x01);
    assert_eq!(response[3], 0x7E);
}

#[test]
fn via_t1_underflow_raises_ifr_bit() {
    let timers = Rc::new(RefCell::new(emppc::timers::TimerManager::new()));
    let cuda = emppc::viacuda::ViaCuda::new(
        Rc::clone(&timers),
        emppc::adb::AdbBus::new(),
        emppc::machine::PowerCtl::new(),
    );
    {
        let mut cuda = cuda.borrow_mut();
        cuda.write(VIA_IER, 0x80 | 0x40); // enable T1
        cuda.write(VIA_T1CL, 0x10);
        cuda.write(VIA_T1CH, 0x00); // load 0x0010 and start
        assert_eq!(cuda.read(VIA_IFR) & 0x40, 0);
    }
    // (counter + 3) VIA clocks at 783360 Hz come due within 40 us
    timers.borrow_mut().advance(40_000);
    run_due(&timers);
    let mut cuda = cuda.borrow_mut();
    let ifr = cuda.read(VIA_IFR);
    assert_eq!(ifr & 0x40, 0x40);
    assert_eq!(ifr & 0x80, 0x80); // IRQ summary bit
}

// -------------------------------------------------------------- interrupts

#[test]
fn edge_latch_gives_one_pin_transition() {
    let pin = IntPin::new();
    let ctrl = MacIoIntCtrl::new(MacIoKind::GrandCentral, pin.clone());
    let irq = ctrl.borrow_mut().register_dev_int(IntSrc::ViaCuda);
    assert_eq!(irq, 1 << 0x12);
    ctrl.borrow_mut().write_mask1(irq as u32);

    assert!(!pin.is_asserted());
    ctrl.borrow_mut().ack_int(irq, 1);
    assert!(pin.is_asserted());
    // falling edge does not clear the latched event
    ctrl.borrow_mut().ack_int(irq, 0);
    assert!(pin.is_asserted());
    assert_eq!(ctrl.borrow().events1(), irq as u32);
    // the clear register releases the pin
    ctrl.borrow_mut().write_clear1(irq as u32);
    assert!(!pin.is_asserted());
}

#[test]
fn masked_sources_latch_but_stay_silent() {
    let pin = IntPin::new();
    let ctrl = MacIoIntCtrl::new(MacIoKind::Heathrow, pin.clone());
    let irq = ctrl.borrow_mut().register_dev_int(IntSrc::Swim3);
    ctrl.borrow_mut().ack_int(irq, 1);
    assert!(!pin.is_asserted());
    assert_eq!(ctrl.borrow().events1(), irq as u32);
    // unmasking later raises the pin from the latched event
    ctrl.borrow_mut().write_mask1(irq as u32);
    assert!(pin.is_asserted());
}

#[test]
fn heathrow_maps_ethernet_into_the_high_window() {
    let pin = IntPin::new();
    let ctrl = MacIoIntCtrl::new(MacIoKind::Heathrow, pin.clone());
    let irq = ctrl.borrow_mut().register_dev_int(IntSrc::Ethernet);
    assert_eq!(irq, 1u64 << 0x2A);
    ctrl.borrow_mut().write_mask2((irq >> 32) as u32);
    ctrl.borrow_mut().ack_int(irq, 1);
    assert!(pin.is_asserted());
    assert_eq!(ctrl.borrow().events2(), (irq >> 32) as u32);
    ctrl.borrow_mut().write_clear2((irq >> 32) as u32);
    assert!(!pin.is_asserted());
}

// ------------------------------------------------------------------ DBDMA

struct RecordingSink {
    bytes: Vec<u8>,
    ack: u8,
}

impl DmaDevice for RecordingSink {
    fn push_data(&mut self, data: &[u8]) -> u8 {
        self.bytes.extend_from_slice(data);
        self.ack
    }
}

#[test]
fn output_last_then_stop_moves_16_bytes() {
    let mut map = AddressMap::new();
    map.add_ram_region(0, 0x10000);
    let map = Rc::new(RefCell::new(map));

    for i in 0..16u32 {
        map.borrow().write(0x2000 + i, i, Size::Byte);
    }
    let chain = [
        make_descriptor(CMD_OUTPUT_LAST, 16, 0x2000, 0, 3, 0, 0), // interrupt always
        make_descriptor(CMD_STOP, 0, 0, 0, 0, 0, 0),
    ];
    for (i, desc) in chain.iter().enumerate() {
        map.borrow().write_bytes(0x3000 + 16 * i as u32, desc);
    }

    let pin = IntPin::new();
    let int_ctrl = MacIoIntCtrl::new(MacIoKind::GrandCentral, pin.clone());
    let irq = int_ctrl.borrow_mut().register_dma_int(IntSrc::DmaScsiCurio);
    int_ctrl.borrow_mut().write_mask1(irq as u32);

    let sink = Rc::new(RefCell::new(RecordingSink { bytes: Vec::new(), ack: 0x5A }));
    let ch = DmaChannel::new("dma_test", Rc::clone(&map));
    {
        let mut ch = ch.borrow_mut();
        ch.connect_device(sink.clone(), true);
        ch.register_dma_int(int_ctrl.clone(), irq);
        ch.reg_write(0x0C, 0x3000u32.swap_bytes(), Size::Word); // command pointer
        ch.reg_write(0x00, 0x8000_8000u32.swap_bytes(), Size::Word); // set RUN
    }

    // the sink saw all 16 bytes in order
    assert_eq!(sink.borrow().bytes, (0..16).collect::<Vec<u8>>());
    // descriptor writeback: res_count 0, xfer_status carries the ack
    let res_count = map.borrow().read(0x300C, Size::Byte) | (map.borrow().read(0x300D, Size::Byte) << 8);
    assert_eq!(res_count, 0);
    let xfer_status = map.borrow().read(0x300E, Size::Byte) | (map.borrow().read(0x300F, Size::Byte) << 8);
    assert_eq!(xfer_status & 0xFF, 0x5A);
    // channel stopped at STOP and raised its interrupt
    assert!(!ch.borrow().is_active());
    assert!(pin.is_asserted());
}

#[test]
fn input_chain_accepts_device_pushes() {
    let mut map = AddressMap::new();
    map.add_ram_region(0, 0x10000);
    let map = Rc::new(RefCell::new(map));
    let chain = [
        make_descriptor(emppc::dbdma::CMD_INPUT_LAST, 8, 0x4000, 0, 0, 0, 0),
        make_descriptor(CMD_STOP, 0, 0, 0, 0, 0, 0),
    ];
    for (i, desc) in chain.iter().enumerate() {
        map.borrow().write_bytes(0x5000 + 16 * i as u32, desc);
    }
    let ch = DmaChannel::new("dma_in_test", Rc::clone(&map));
    {
        let mut ch = ch.borrow_mut();
        ch.reg_write(0x0C, 0x5000u32.swap_bytes(), Size::Word);
        ch.reg_write(0x00, 0x8000_8000u32.swap_bytes(), Size::Word);
        let consumed = ch.push_data(&[1, 2, 3, 4, 5, 6, 7, 8], 0x11);
        assert_eq!(consumed, 8);
    }
    for i in 0..8u32 {
        assert_eq!(map.borrow().read(0x4000 + i, Size::Byte), (i + 1) as u32);
    }
}

// ---------------------------------------------------------------- machines

#[test]
fn all_presets_construct() {
    for name in ["pmac6100", "pmac7500", "pmacg3"].iter() {
        let machine = create_machine(name, &[], Rc::new(RefCell::new(NullDisplay)), Box::new(NullAudioOut));
        let machine = machine.expect("preset failed");
        assert!(machine.via_cuda().is_some(), "{} lacks a Cuda", name);
        assert!(machine.int_ctrl.is_some(), "{} lacks an interrupt controller", name);
    }
}

#[test]
fn machine_map_matches_the_address_table() {
    let machine = pmac7500();
    let map = machine.map.borrow();
    // RAM answers at zero, the ROM mirror answers at 0x40000000
    map.write(0x100, 0x1234_5678, Size::Word);
    assert_eq!(map.read(0x100, Size::Word), 0x1234_5678);
    machine.rom.as_ref().unwrap().borrow_mut()[0..4].copy_from_slice(&0xFEED_FACEu32.to_be_bytes());
    assert_eq!(map.read(0xFFC0_0000, Size::Word), 0xFEED_FACE);
    assert_eq!(map.read(0x4000_0000, Size::Word), 0xFEED_FACE);
    // ROM refuses stores
    map.write(0xFFC0_0000, 0, Size::Word);
    assert_eq!(map.read(0xFFC0_0000, Size::Word), 0xFEED_FACE);
}

#[test]
fn bad_property_values_are_rejected() {
    let overrides = vec![("gfxmem_size".to_string(), "9".to_string())];
    let result = create_machine(
        "pmac7500",
        &overrides,
        Rc::new(RefCell::new(NullDisplay)),
        Box::new(NullAudioOut),
    );
    assert!(result.is_err());
}

#[test]
fn adb_keyboard_autopolls_through_cuda() {
    let machine = pmac7500();
    let kbd = AdbKeyboard::new();
    machine.adb_bus.borrow_mut().attach(kbd.clone());
    kbd.borrow_mut().key_event(0x1C, true);
    let cmd = machine.adb_bus.borrow_mut().poll();
    assert_eq!(cmd, (2 << 4) | 0x0C); // Talk 0 of device 2
    assert_eq!(machine.adb_bus.borrow().output_buf()[0], 0x1C);
}
