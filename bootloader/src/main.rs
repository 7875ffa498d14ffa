//! machboot-inspect - dry run of the loader on the host
//!
//! Loads a Mach-O kernel and an Apple device tree from files into a scratch
//! window standing in for the board's memory, builds the boot arguments,
//! and prints what the kernel would be handed. Control is never transferred.

use std::env;
use std::fs;
use std::io;
use std::process::ExitCode;

use machboot::kernel_if::load_span;
use machboot::utils::boot_traits::{EnvPairs, NoDisplay};
use machboot::utils::logger::{self, Console};
use machboot::utils::mem_util::align_up;
use machboot::{
    BootConfig, BootError, BootServices, DeviceTree, MachImage, PhysWindow, load_mach_o,
    prepare_handoff,
};
use xnu_api::BootArgs;

struct Stdout;

impl Console for Stdout {
    fn write_str(&self, s: &str) {
        print!("{}", s);
    }
}

static STDOUT: Stdout = Stdout;

enum InspectError {
    Io(&'static str, io::Error),
    Boot(BootError),
}

impl From<BootError> for InspectError {
    fn from(err: BootError) -> Self {
        InspectError::Boot(err)
    }
}

impl InspectError {
    fn exit_code(&self) -> ExitCode {
        match self {
            InspectError::Io(..) => ExitCode::from(1),
            InspectError::Boot(err) => ExitCode::from(err.exit_status() as u8),
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: machboot-inspect <kernel.macho> <devicetree.bin> [bootargs]");
        return ExitCode::from(1);
    }

    logger::init(&STDOUT);

    match inspect(&args[1], &args[2], args.get(3).map(String::as_str)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                InspectError::Io(path, io_err) => eprintln!("{}: {}", path, io_err),
                InspectError::Boot(boot_err) if boot_err.is_image_error() => {
                    eprintln!("{}: {}", args[1], boot_err)
                }
                InspectError::Boot(boot_err) => eprintln!("{}", boot_err),
            }
            err.exit_code()
        }
    }
}

fn inspect(kernel_path: &str, tree_path: &str, bootargs: Option<&str>) -> Result<(), InspectError> {
    let config = BootConfig::board();

    let kernel = fs::read(kernel_path).map_err(|e| InspectError::Io("kernel", e))?;
    let tree_bytes = fs::read(tree_path).map_err(|e| InspectError::Io("device tree", e))?;

    let image = MachImage::parse(&kernel, config.word_size)?;
    let span = load_span(&image)?;
    if span.is_empty() {
        return Err(BootError::NotAnImage.into());
    }
    let device_tree = DeviceTree::parse(&tree_bytes, config.device_tree_max_depth)?;

    // Image, boot args, device tree, then alignment slack
    let needed = span.span() + BootArgs::SIZE as u64 + device_tree.len() as u64;
    let scratch_len = align_up(needed, config.phys_end_align).ok_or(BootError::OutOfWindow)?
        + config.phys_end_align;
    let mut scratch = vec![0u8; scratch_len as usize];
    let mut window = PhysWindow::new(config.load_addr, &mut scratch);

    let info = load_mach_o(&image, &mut window, config.load_addr)?;

    let pairs = [("bootargs", bootargs.unwrap_or_default())];
    let env = EnvPairs(if bootargs.is_some() { &pairs } else { &[] });
    let services = BootServices::new(&env, &NoDisplay);
    let handoff = prepare_handoff(&info, &device_tree, &mut window, &config, &services)?;
    let boot_args = handoff.boot_args();

    println!("kernel        {}", kernel_path);
    println!("  cpu type    {:#x}", image.header().cpu_type);
    println!("  load cmds   {}", image.header().commands_nb);
    println!("  virt base   {:#x}", info.base);
    println!("  virt end    {:#x}", info.end);
    println!("  virt entry  {:#x}", info.entry);
    if let Some(thread) = info.thread {
        println!("  thread      flavor {} sp {:?}", thread.flavor, thread.sp);
    }
    println!("physical");
    println!("  entry       {:#x}", handoff.entry());
    println!("  boot args   {:#x}", handoff.boot_args_addr());
    println!("  device tree {:#x} ({} bytes)", handoff.device_tree_addr(), device_tree.len());
    println!(
        "device tree   {} root properties, {} children",
        device_tree.root_properties(),
        device_tree.root_children()
    );
    println!("boot args     {:?}", boot_args);
    Ok(())
}
