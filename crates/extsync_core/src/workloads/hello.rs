use serde_json::json;

use crate::chain::StepError;
use crate::contract::{Args, Context};
use crate::syscalls::{Label, Syscalls};

pub const KEY_COUNT: usize = 10;
const APP_DIR: &str = "/hello";
const DATA_DIR: &str = "/hello/data";

/// Writes ten keys, externalizes, then reads them back.
///
/// A mismatch is reported in the result rather than failing the step.
pub fn run(_args: Args, _context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    for i in 0..KEY_COUNT {
        syscalls.write_key(format!("key{i}").as_bytes(), format!("val{i}").as_bytes())?;
    }

    syscalls.externalize()?;

    for i in 0..KEY_COUNT {
        let key = format!("key{i}");
        let value = syscalls.read_key(key.as_bytes())?;
        if value != format!("val{i}").as_bytes() {
            return Ok(Args::from([(
                "error".to_string(),
                json!(format!(
                    "Got response {} from {key}",
                    String::from_utf8_lossy(&value)
                )),
            )]));
        }
    }

    Ok(Args::from([(
        "success".to_string(),
        json!(format!("{KEY_COUNT} keys write/read")),
    )]))
}

/// Same round trip over the labeled filesystem variant.
pub fn run_fs(_args: Args, _context: &Context, syscalls: &dyn Syscalls) -> Result<Args, StepError> {
    let fs = syscalls
        .fs()
        .ok_or_else(|| StepError::Failed("filesystem syscalls are unavailable".to_string()))?;
    let label = Label::public();

    fs.create_dir(APP_DIR, &label)?;
    fs.create_dir(DATA_DIR, &label)?;
    for i in 0..KEY_COUNT {
        let path = format!("{DATA_DIR}/file{i}.txt");
        fs.create_file(&path, &label)?;
        fs.write(&path, format!("val{i}").as_bytes(), &label)?;
    }

    syscalls.externalize()?;

    for i in 0..KEY_COUNT {
        let path = format!("{DATA_DIR}/file{i}.txt");
        let data = fs.read(&path, &label)?;
        if data != format!("val{i}").as_bytes() {
            return Ok(Args::from([(
                "error".to_string(),
                json!(format!(
                    "Got response {} from {path}",
                    String::from_utf8_lossy(&data)
                )),
            )]));
        }
    }

    Ok(Args::from([(
        "success".to_string(),
        json!(format!("{KEY_COUNT} files write/read")),
    )]))
}
