use qlisp::evaluator;
use qlisp::syntax;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("qlisp {}", env!("CARGO_PKG_VERSION"));
    println!("Enter expressions like: (+ 1 (* 2 3))");
    println!("Press Ctrl+C or type exit to leave");
    println!();

    let mut rl = DefaultEditor::new().expect("could not initialize line editor");
    let env = evaluator::create_global_env();

    loop {
        match rl.readline("qlisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match syntax::parse(line) {
                    Ok(expr) => match evaluator::eval(&expr, &env) {
                        Ok(value) => println!("{value}"),
                        Err(err) => println!("Error: {err}"),
                    },
                    Err(err) => println!("Error: {err}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}
