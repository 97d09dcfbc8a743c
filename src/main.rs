use anyhow::{bail, Result};
use emppc::awacs::{AudioOut, NullAudioOut, RodioAudioOut};
use emppc::machines::{create_machine, MACHINES};
use emppc::video::{DisplayPtr, NullDisplay, WindowDisplay};
use emppc::Emulator;
use std::cell::RefCell;
use std::env;
use std::rc::Rc;

fn usage() {
    println!("usage: mymac [options] [key=value ...]");
    println!();
    println!("  --machine <name>   machine to emulate (default pmacg3)");
    println!("  --rom <path>       boot ROM image");
    println!("  --debug            attach the interactive debugger");
    println!("  --deterministic    freeze wall-clock sources");
    println!("  --window           open a host display window");
    println!("  --audio            open the host audio sink");
    println!("  --list             list supported machines and exit");
}

fn main() -> Result<()> {
    env_logger::init();

    let mut machine_name = "pmacg3".to_string();
    let mut rom_path: Option<String> = None;
    let mut debug = false;
    let mut deterministic = false;
    let mut window = false;
    let mut audio = false;
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--machine" => match args.next() {
                Some(name) => machine_name = name,
                None => bail!("--machine needs a name"),
            },
            "--rom" => match args.next() {
                Some(path) => rom_path = Some(path),
                None => bail!("--rom needs a path"),
            },
            "--debug" => debug = true,
            "--deterministic" => deterministic = true,
            "--window" => window = true,
            "--audio" => audio = true,
            "--list" => {
                for m in MACHINES {
                    println!("{:12} {}", m.name, m.description);
                }
                return Ok(());
            }
            "--help" | "-h" => {
                usage();
                return Ok(());
            }
            other => match other.split_once('=') {
                Some((key, value)) => overrides.push((key.to_string(), value.to_string())),
                None => bail!("unrecognized argument '{}'", other),
            },
        }
    }

    let display: DisplayPtr = if window {
        Rc::new(RefCell::new(WindowDisplay::new("mymac")))
    } else {
        Rc::new(RefCell::new(NullDisplay))
    };
    let audio_out: Box<dyn AudioOut> = if audio {
        Box::new(RodioAudioOut::new()?)
    } else {
        Box::new(NullAudioOut)
    };

    let machine = create_machine(&machine_name, &overrides, display, audio_out)?;
    let mut emulator = Emulator::new(machine);
    emulator.set_deterministic(deterministic);

    match rom_path {
        Some(path) => emulator.load_rom(&path)?,
        None => log::warn!("No ROM image given; the machine will fetch zeroes"),
    }

    emulator.run(debug);
    Ok(())
}
