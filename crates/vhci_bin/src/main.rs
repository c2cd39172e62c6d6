use std::error::Error;

use clap::Parser;
use log::info;
use vhci::{Config, Kernel, Modals, Vhci, VscfOptions, die, max_threads};
use vscf::Vscf;

/// vibrational heat-bath configuration interaction
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML input file
    #[arg(value_parser, default_value_t = String::from("vhci.toml"))]
    infile: String,

    /// Set the maximum number of threads to use. Defaults to 0, which means to
    /// use the `threads` value from the input file, or as many threads as
    /// there are CPUs if that is also 0.
    #[arg(short, long, default_value_t = 0)]
    threads: usize,

    /// Writes the output in JSON format for use by other programs
    #[arg(short, long, value_parser, default_value_t = false)]
    json: bool,

    /// Run deterministic PT2 after converging the variational energies
    #[arg(short, long, default_value_t = false)]
    pt2: bool,

    /// Run stochastic PT2, or semi-stochastic PT2 if eps3 is set in the input
    #[arg(short, long, default_value_t = false)]
    spt2: bool,

    /// Compare PT2, SPT2, and SSPT2 on the converged basis
    #[arg(short, long, default_value_t = false)]
    compare: bool,

    /// Skip the heat-bath iterations and stop at VCI in the initial basis
    #[arg(short, long, default_value_t = false)]
    no_vhci: bool,

    /// Use VSCF modals even if the input file has no [vscf] table
    #[arg(long, default_value_t = false)]
    vscf: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    let mut config = match Config::load(&args.infile) {
        Ok(c) => c,
        Err(e) => die!("failed to load {}: {e}", args.infile),
    };
    if args.vscf && config.vscf.is_none() {
        config.vscf = Some(VscfOptions::default());
        config.validate()?;
    }
    max_threads(if args.threads > 0 {
        args.threads
    } else {
        config.threads
    });

    let modals = if config.vscf.is_some() {
        let mut vscf = Vscf::from_config(&config)?;
        let iters = vscf.scf()?;
        info!("VSCF converged after {iters} iterations");
        if !args.json {
            println!("===== VSCF RESULTS =====");
            println!("{vscf}");
        }
        Modals::Vscf(vscf.modals()?)
    } else {
        Modals::Harmonic(config.frequencies.clone())
    };

    let mut vhci = Vhci::new(config, modals)?;
    let opts = Kernel {
        do_vhci: !args.no_vhci,
        do_pt2: args.pt2,
        do_spt2: args.spt2,
        compare_pt2: args.compare,
    };
    if args.json {
        let out = vhci.kernel(&mut std::io::sink(), opts)?;
        let data = serde_json::to_string_pretty(&out)?;
        println!("{data}");
    } else {
        vhci.kernel(&mut std::io::stdout(), opts)?;
    }
    Ok(())
}
