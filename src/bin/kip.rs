use std::env;
use std::path::PathBuf;

use kipvm::context;
use kipvm::engine::{Engine, RunOptions};
use kipvm::instruction;
use kipvm::load_file;
use kipvm::logging::error;
use kipvm::result_log::ResultLog;

const RAM_SIZE: usize = 1 << 20;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <input.kip> [verbosity]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let verbosity: u8 = match args.get(2) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            error(format!("invalid verbosity: {}", raw));
            std::process::exit(1);
        }),
        None => 1,
    };

    let source_lines = load_file(&input_path).unwrap_or_else(|e| {
        error(format!("failed to read {}: {}", input_path.display(), e));
        std::process::exit(2);
    });

    let import_base_folder = input_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let build = context::build(source_lines, import_base_folder.clone(), &load_file).unwrap_or_else(|e| {
        error(e.to_string());
        std::process::exit(3);
    });

    let mut instructions = Vec::with_capacity(build.lines.len());
    for (i, line) in build.lines.iter().enumerate() {
        match instruction::parse_line(line, i + 1, &build.context) {
            Ok(instr) => instructions.push(instr),
            Err(e) => {
                error(e.to_string());
                std::process::exit(3);
            }
        }
    }

    let mut ram = vec![0u8; RAM_SIZE];
    let mut engine = Engine::new();
    engine.map_memory_buffer(&mut ram, 0);

    let options = RunOptions { verbosity, instruction_budget: None };
    let results = engine.interpret_lines(&instructions, build.initial_pc, import_base_folder, &options);

    let mut log = ResultLog::new(results.len());
    log.extend(results, verbosity);
    for entry in log.entries() {
        if entry.success {
            println!("{}", entry.message);
        } else {
            error(entry.message.clone());
        }
    }

    if !log.all_succeeded() {
        std::process::exit(4);
    }
}
