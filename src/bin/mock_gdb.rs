//! Mock gdb console for integration testing
//!
//! Answers the handful of console commands the gateway sends with canned,
//! gdb-shaped text, so sessions can be exercised without a real debugger.
//! Like gdb, it prints its prompt without a newline and reports failures on
//! stderr.

use std::io::{BufRead, Write};

const SOURCE_FILE: &str = "fib.c";
const SOURCE_DIR: &str = "/src";
const FIRST_LINE: u32 = 10;

/// Lines of the fake program, starting at [`FIRST_LINE`]
const PROGRAM: &[&str] = &[
    "  int n = 3;",
    "  long total = fib(n);",
    "  printf(\"%ld\\n\", total);",
    "  return 0;",
];

#[derive(Default)]
struct MockState {
    running: bool,
    line: u32,
    breakpoints: u32,
    values: u32,
}

impl MockState {
    fn handle(&mut self, command: &str, out: &mut impl Write) -> std::io::Result<bool> {
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        match verb {
            "" | "set" => {}
            "quit" => return Ok(false),
            "list" => {
                for (i, text) in PROGRAM.iter().enumerate() {
                    writeln!(out, "{}\t{}", FIRST_LINE + i as u32, text)?;
                }
            }
            "info" => match rest {
                "source" => {
                    writeln!(out, "Current source file is {}", SOURCE_FILE)?;
                    writeln!(out, "Compilation directory is {}", SOURCE_DIR)?;
                    writeln!(out, "Located in {}/{}", SOURCE_DIR, SOURCE_FILE)?;
                    writeln!(out, "Contains {} lines.", FIRST_LINE as usize + PROGRAM.len())?;
                    writeln!(out, "Source language is c.")?;
                }
                "locals" if self.running => {
                    writeln!(out, "n = 3")?;
                    writeln!(out, "total = 0x0")?;
                }
                "args" if self.running => writeln!(out, "No arguments.")?,
                "locals" | "args" => eprintln!("No frame selected."),
                other => eprintln!("Undefined info command: \"{}\".", other),
            },
            "break" => {
                let location = rest.rsplit(':').next().unwrap_or(rest);
                match location.parse::<u32>() {
                    Ok(line) => {
                        self.breakpoints += 1;
                        writeln!(
                            out,
                            "Breakpoint {} at 0x{:x}: file {}, line {}.",
                            self.breakpoints,
                            0x1139 + line * 4,
                            SOURCE_FILE,
                            line
                        )?;
                    }
                    Err(_) => eprintln!("Function \"{}\" not defined.", rest),
                }
            }
            "run" => {
                self.running = true;
                self.line = FIRST_LINE;
                writeln!(out, "Starting program: /src/fib")?;
                writeln!(out)?;
                writeln!(out, "Breakpoint 1, main () at {}:{}", SOURCE_FILE, self.line)?;
                self.print_line(out)?;
            }
            "step" | "next" => {
                if !self.running {
                    eprintln!("The program is not being run.");
                } else if (self.line - FIRST_LINE) as usize + 1 < PROGRAM.len() {
                    self.line += 1;
                    self.print_line(out)?;
                } else {
                    self.running = false;
                    writeln!(out, "[Inferior 1 (process 4242) exited normally]")?;
                }
            }
            "backtrace" | "bt" => {
                if self.running {
                    writeln!(out, "#0  main () at {}:{}", SOURCE_FILE, self.line)?;
                } else {
                    eprintln!("No stack.");
                }
            }
            "frame" => match rest {
                "0" if self.running => {
                    writeln!(out, "#0  main () at {}:{}", SOURCE_FILE, self.line)?;
                    self.print_line(out)?;
                }
                _ if self.running => eprintln!("No frame at level {}.", rest),
                _ => eprintln!("No stack."),
            },
            "ptype" => match rest {
                "n" => writeln!(out, "type = int")?,
                "total" => writeln!(out, "type = long")?,
                other => eprintln!("No symbol \"{}\" in current context.", other),
            },
            "print" | "p" => {
                let value = match rest {
                    "n" if self.running => Some("3"),
                    "total" if self.running => Some("0"),
                    _ => None,
                };
                match value {
                    Some(value) => {
                        self.values += 1;
                        writeln!(out, "${} = {}", self.values, value)?;
                    }
                    None => eprintln!("No symbol \"{}\" in current context.", rest),
                }
            }
            other => eprintln!("Undefined command: \"{}\".  Try \"help\".", other),
        }
        Ok(true)
    }

    fn print_line(&self, out: &mut impl Write) -> std::io::Result<()> {
        let text = PROGRAM[(self.line - FIRST_LINE) as usize];
        writeln!(out, "{}\t{}", self.line, text)
    }
}

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut state = MockState::default();

    let _ = writeln!(out, "GNU gdb (mock) 14.2");
    let _ = writeln!(out, "Reading symbols from target...");

    for line in stdin.lock().lines() {
        let _ = write!(out, "(gdb) ");
        let _ = out.flush();

        let Ok(line) = line else { break };
        match state.handle(line.trim(), &mut out) {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
        let _ = out.flush();
    }
}
