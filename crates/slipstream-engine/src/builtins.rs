//! Default globals installed into every engine instance.

use crate::runtime::Value;
use crate::Engine;

/// Installs the default globals (`console`, `globalThis`).
pub(crate) fn install(engine: &mut Engine) {
    let console = engine.alloc_object();

    let log = engine.native("log", |_engine, args| {
        println!("{}", format_args_list(args));
        Ok(Value::Undefined)
    });
    let error = engine.native("error", |_engine, args| {
        eprintln!("{}", format_args_list(args));
        Ok(Value::Undefined)
    });

    // set_property on a fresh object cannot fail
    let _ = engine.set_property(&console, "log", log);
    let _ = engine.set_property(&console, "error", error);

    engine.define_global("console", console);

    let global_this = engine.alloc_object();
    engine.define_global("globalThis", global_this);
}

fn format_args_list(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
