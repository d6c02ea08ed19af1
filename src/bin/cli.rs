//! Stmboot command line interface.

use std::fs;
use std::process;

use clap::{crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, trace, LevelFilter};
use simplelog::*;

use stmboot::{CdevGpio, Flasher, SettingsBuilder, PACKET_SIZE};

fn main() {
    println!("[SB] stmboot v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .about(crate_description!())
        .long_about(
            "\n\
            Stmboot drives the STM32 factory USART bootloader from a board \
            that has the target's NRST and BOOT0 pins wired to two of its \
            GPIO lines. It resets the target into system-memory boot, \
            mass-erases the application flash, writes the image in 256-byte \
            packets, and resets the target back into its own firmware - \
            also when anything goes wrong along the way.\n\
            \n\
            The firmware image is a raw binary blob; it is written verbatim \
            at the given base address.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the tty device wired to the target's bootloader USART")
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .required(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .long_help(
                    "serial baud rate; the bootloader autobauds from the \
                     first byte, 115200 is the highest officially supported \
                     rate",
                )
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("115200")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("RESET_PIN")
                .help("GPIO line wired to the target's NRST pin")
                .short("-r")
                .long("--reset-pin")
                .takes_value(true)
                .default_value("17")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BOOT0_PIN")
                .help("GPIO line wired to the target's BOOT0 pin")
                .short("-B")
                .long("--boot0-pin")
                .takes_value(true)
                .default_value("18")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("GPIO_CHIP")
                .help("GPIO character device the pins live on")
                .short("-g")
                .long("--gpio-chip")
                .takes_value(true)
                .default_value("/dev/gpiochip0")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("ADDRESS")
                .help("base address the image is flashed at")
                .short("-a")
                .long("--address")
                .takes_value(true)
                .default_value("0x08000000")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FIRMWARE")
                .help("path to the firmware image to be flashed")
                .required(true)
                .index(1),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose"
    // flag (i.e. 'stmboot -v -v -v' or 'stmboot -vvv' vs 'stmboot -v')
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    // It's safe to call unwrap on all command line arguments with default
    // values, because the value will either be what the user input at
    // runtime or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32)
        .unwrap_or_else(|_| bad_value("baud-rate", matches.value_of("BAUD_RATE").unwrap()));
    let reset_pin = value_t!(matches.value_of("RESET_PIN"), u8)
        .unwrap_or_else(|_| bad_value("reset-pin", matches.value_of("RESET_PIN").unwrap()));
    let boot0_pin = value_t!(matches.value_of("BOOT0_PIN"), u8)
        .unwrap_or_else(|_| bad_value("boot0-pin", matches.value_of("BOOT0_PIN").unwrap()));

    let address_text = matches.value_of("ADDRESS").unwrap();
    let address =
        parse_address(address_text).unwrap_or_else(|| bad_value("address", address_text));

    let settings = SettingsBuilder::new()
        .path(matches.value_of("DEVICE_TTY").unwrap())
        .baud_rate(baud_rate)
        .reset_pin(reset_pin)
        .boot0_pin(boot0_pin)
        .finalize();

    let image_path = matches.value_of("FIRMWARE").unwrap();
    let data = fs::read(image_path).unwrap_or_else(|e| {
        println!(
            "{}",
            style(format!("[SB] 🙁 could not read `{}`: {}", image_path, e)).red()
        );
        process::exit(1);
    });
    println!(
        "[SB] 📦 {} ({} bytes) -> {}",
        style(image_path).cyan(),
        data.len(),
        style(format!("{:#010x}", address)).cyan()
    );

    let gpio = CdevGpio::new(matches.value_of("GPIO_CHIP").unwrap());
    let mut flasher = Flasher::new(settings, Box::new(gpio));

    if let Err(e) = flasher.init() {
        report_failure(&e);
        process::exit(1);
    }

    let pb = ProgressBar::new(data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "[SB] ⏩ Flashing [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .progress_chars("=>-"),
    );

    let result = flasher.flash_with_progress(address, &data, |p| {
        pb.set_length(p.total as u64);
        pb.set_position(((p.offset + PACKET_SIZE).min(p.total)) as u64);
    });

    match result {
        Ok(()) => {
            pb.finish();
            println!(
                "{}",
                style("[SB] ✅ Firmware flashed, target restarted").green()
            );
            debug!("exit code: 0");
        }
        Err(e) => {
            pb.abandon();
            report_failure(&e);
            process::exit(1);
        }
    }
}

/// Accepts plain decimal or 0x-prefixed hex.
fn parse_address(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn bad_value(option: &str, value: &str) -> ! {
    println!(
        "{}: `{}` got an invalid value",
        style("error").red(),
        style(option).cyan()
    );
    println!(
        "   {} `{}` is not a valid value",
        style("-->").cyan(),
        style(value).on_red()
    );
    process::exit(1);
}

fn report_failure(error: &stmboot::Error) {
    use std::error::Error;

    println!("{}", style(format!("[SB] 💥 {}", error)).red());
    let mut source = error.source();
    while let Some(cause) = source {
        println!("   {} {}", style("caused by:").dim(), cause);
        source = cause.source();
    }
}
