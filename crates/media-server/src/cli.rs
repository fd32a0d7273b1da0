//! Command-line contract: `-c <config>` loads a dotenv-style settings
//! file before configuration is read from the environment, `-t` validates
//! it and exits without starting any listener, `-v`/`-V` print the
//! version, and `-g <file>` names a signal file this process only ever
//! reads (hot reload of it is out of scope, per SPEC_FULL's CLI section).

use std::path::PathBuf;

pub struct Args {
    pub config_path: Option<PathBuf>,
    pub validate_only: bool,
    pub print_version: bool,
    pub signal_file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
}

pub fn parse(mut raw: impl Iterator<Item = String>) -> Result<Args, ArgsError> {
    raw.next(); // argv[0]

    let mut args = Args {
        config_path: None,
        validate_only: false,
        print_version: false,
        signal_file: None,
    };

    let mut iter = raw;
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "-c" => {
                let value = iter.next().ok_or(ArgsError::MissingValue("-c"))?;
                args.config_path = Some(PathBuf::from(value));
            }
            "-t" => args.validate_only = true,
            "-v" | "-V" => args.print_version = true,
            "-g" => {
                let value = iter.next().ok_or(ArgsError::MissingValue("-g"))?;
                args.signal_file = Some(PathBuf::from(value));
            }
            other => return Err(ArgsError::Unrecognized(other.to_string())),
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv<'a>(parts: &'a [&str]) -> impl Iterator<Item = String> + 'a {
        std::iter::once("media-server".to_string()).chain(parts.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_config_path_and_test_flag() {
        let args = parse(argv(&["-c", "server.env", "-t"])).unwrap();
        assert_eq!(args.config_path, Some(PathBuf::from("server.env")));
        assert!(args.validate_only);
    }

    #[test]
    fn parses_version_and_signal_file() {
        let args = parse(argv(&["-v", "-g", "/var/run/media-server.sig"])).unwrap();
        assert!(args.print_version);
        assert_eq!(args.signal_file, Some(PathBuf::from("/var/run/media-server.sig")));
    }

    #[test]
    fn missing_value_is_an_error() {
        assert!(parse(argv(&["-c"])).is_err());
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse(argv(&["--bogus"])).is_err());
    }
}
