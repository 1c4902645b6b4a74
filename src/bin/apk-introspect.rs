use apk_introspect::android::apk::Apk;
use apk_introspect::android::zip::ApkFile;
use std::env;
use std::error::Error;

// Inspects the manifest of an APK and optionally writes a debuggable copy.

//Usage: apk-introspect <apk-file> <info|manifest|files|dump <dir>|debuggable <out.apk>>
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <apk-file> <info|manifest|files|dump <dir>|debuggable <out.apk>>",
            args[0]
        );
        std::process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2], args.get(3).map(String::as_str)) {
        eprintln!("Aborted due to error: {e}");
        std::process::exit(1);
    }
}

fn run(apk_path: &str, command: &str, argument: Option<&str>) -> Result<(), Box<dyn Error>> {
    let apk = Apk::open(apk_path)?;
    match (command, argument) {
        ("info", _) => print_info(&apk)?,
        ("manifest", _) => print!("{}", apk.android_manifest()?),
        ("files", _) => {
            for name in apk.files() {
                println!("{name}");
            }
        }
        ("dump", Some(dir)) => {
            let target = apk.dump(dir)?;
            println!("Wrote {}", target.display());
        }
        ("debuggable", Some(output)) => {
            if apk.is_debuggable()? {
                println!("{apk_path} is already debuggable; writing a copy");
            }
            apk.write_debuggable(output)?;
            println!("Wrote debuggable APK to {output}");
        }
        (other, _) => return Err(format!("unknown command or missing argument: {other}").into()),
    }
    Ok(())
}

fn print_info(apk: &Apk<ApkFile>) -> Result<(), Box<dyn Error>> {
    let properties = apk.properties()?;
    println!("valid:        {}", properties.valid);
    if let Some(debuggable) = properties.debuggable {
        println!("debuggable:   {debuggable}");
    }
    for (label, value) in [
        ("package:     ", &properties.package_name),
        ("versionCode: ", &properties.version_code),
        ("versionName: ", &properties.version_name),
    ] {
        if let Some(value) = value {
            println!("{label} {value}");
        }
    }
    println!("files:        {}", apk.files().len());
    Ok(())
}
