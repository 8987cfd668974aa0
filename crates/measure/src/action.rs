//! Composable card operations
//!
//! Actions form a closed set of variants compiled from token descriptions;
//! unknown names and malformed argument lists are rejected when a case is
//! loaded, not when it runs. Every action reports the elapsed time of its
//! measured portion.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use jcbench_apdu_core::{Aid, Channel, CommandApdu, ResetKind};
use jcbench_globalplatform::{CapFile, Error as GpError, SecurityDomain, commands};

use crate::config::ActionDesc;
use crate::context::Context;
use crate::error::{Error, Result};

/// One composable card operation.
#[derive(Debug, Clone)]
pub enum Action {
    /// Remove the package if present, then load it and install its first
    /// applet; timed from the start of the load
    LoadAndInstall {
        /// CAP archive path
        cap: PathBuf,
    },
    /// Delete a package or applet
    Remove {
        /// AID to delete
        aid: Aid,
    },
    /// Remove the package if present, then load it; timed from the load
    LoadCap {
        /// CAP archive path
        cap: PathBuf,
    },
    /// Install an applet from an already loaded package
    InstallApplet {
        /// Package AID
        package: Aid,
        /// Applet AID, also used as the instance AID
        applet: Aid,
    },
    /// Select an application; timed as the transmit's own elapsed time
    Select {
        /// AID to select
        aid: Aid,
    },
    /// Transmit an arbitrary command; timed as the transmit's own elapsed
    /// time
    SendApdu {
        /// Command to transmit
        apdu: CommandApdu,
    },
    /// Reset the card
    Reset,
    /// Ordered children; elapsed time is the sum of theirs
    Script(Vec<Action>),
}

impl Action {
    /// Compile a description into an action tree.
    ///
    /// A list becomes a script of its compiled children. A token string
    /// selects the variant by its first word; the remaining words are the
    /// constructor arguments. Relative CAP paths resolve against
    /// `base_dir`.
    pub fn compile(base_dir: &Path, desc: &ActionDesc) -> Result<Self> {
        match desc {
            ActionDesc::Sequence(children) => Ok(Self::Script(
                children
                    .iter()
                    .map(|child| Self::compile(base_dir, child))
                    .collect::<Result<_>>()?,
            )),
            ActionDesc::Tokens(tokens) => Self::from_tokens(base_dir, tokens),
        }
    }

    fn from_tokens(base_dir: &Path, tokens: &str) -> Result<Self> {
        let malformed = || Error::MalformedAction(tokens.to_owned());
        let mut words = tokens.split_whitespace();
        let name = words.next().ok_or_else(malformed)?;
        let args: Vec<&str> = words.collect();

        let action = match (name, args.as_slice()) {
            ("LoadAndInstall", [cap]) => Self::LoadAndInstall {
                cap: resolve(base_dir, cap),
            },
            ("Remove", [aid]) => Self::Remove {
                aid: Aid::from_hex(aid).map_err(|_| malformed())?,
            },
            ("LoadCap", [cap]) => Self::LoadCap {
                cap: resolve(base_dir, cap),
            },
            ("InstallApplet", [package, applet]) => Self::InstallApplet {
                package: Aid::from_hex(package).map_err(|_| malformed())?,
                applet: Aid::from_hex(applet).map_err(|_| malformed())?,
            },
            ("Select", [aid]) => Self::Select {
                aid: Aid::from_hex(aid).map_err(|_| malformed())?,
            },
            ("SendAPDU", [apdu]) => Self::SendApdu {
                apdu: CommandApdu::from_hex(apdu).map_err(|_| malformed())?,
            },
            ("Reset", []) => Self::Reset,
            (
                "LoadAndInstall" | "Remove" | "LoadCap" | "InstallApplet" | "Select" | "SendAPDU"
                | "Reset",
                _,
            ) => return Err(malformed()),
            _ => return Err(Error::UnknownAction(tokens.to_owned())),
        };
        Ok(action)
    }

    /// Execute the action, returning its elapsed time.
    pub fn run<C: Channel>(&self, ctx: &mut Context<C>) -> Result<Duration> {
        match self {
            Self::LoadAndInstall { cap } => {
                debug!(cap = %cap.display(), "load CAP and install applet");
                let cap = CapFile::open(cap)?;
                let mut domain = SecurityDomain::new(&mut ctx.transport);
                remove_if_present(&mut domain, &cap)?;

                let started = Instant::now();
                domain.load_cap(&cap)?;
                let applet = cap.applet_aids().first().ok_or(Error::NoApplets)?;
                domain.install_applet(cap.package_aid(), applet, None)?;
                Ok(started.elapsed())
            }
            Self::Remove { aid } => {
                debug!(%aid, "remove");
                let mut domain = SecurityDomain::new(&mut ctx.transport);
                let started = Instant::now();
                domain.remove(aid.as_bytes())?;
                Ok(started.elapsed())
            }
            Self::LoadCap { cap } => {
                debug!(cap = %cap.display(), "load CAP file");
                let cap = CapFile::open(cap)?;
                let mut domain = SecurityDomain::new(&mut ctx.transport);
                remove_if_present(&mut domain, &cap)?;

                let started = Instant::now();
                domain.load_cap(&cap)?;
                Ok(started.elapsed())
            }
            Self::InstallApplet { package, applet } => {
                debug!(%package, %applet, "install applet");
                let mut domain = SecurityDomain::new(&mut ctx.transport);
                let started = Instant::now();
                domain.install_applet(package, applet, None)?;
                Ok(started.elapsed())
            }
            Self::Select { aid } => {
                debug!(%aid, "select");
                let cmd = commands::select(aid.as_bytes())?;
                let response = ctx.transport.transmit(&cmd)?;
                Ok(response.elapsed())
            }
            Self::SendApdu { apdu } => {
                debug!(%apdu, "send apdu");
                let response = ctx.transport.transmit(apdu)?;
                Ok(response.elapsed())
            }
            Self::Reset => {
                debug!("reset");
                let started = Instant::now();
                ctx.transport.reset(None, ResetKind::Cold)?;
                Ok(started.elapsed())
            }
            Self::Script(children) => {
                let mut total = Duration::ZERO;
                for child in children {
                    total += child.run(ctx)?;
                }
                Ok(total)
            }
        }
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_owned()
    } else {
        base_dir.join(path)
    }
}

/// Remove-before-load convenience: a status error (the package was simply
/// not there) is swallowed, everything else propagates. The standalone
/// Remove action does not get this treatment.
fn remove_if_present<C: Channel>(
    domain: &mut SecurityDomain<'_, C>,
    cap: &CapFile,
) -> Result<()> {
    match domain.remove(cap.package_aid().as_bytes()) {
        Err(GpError::Status { .. }) => Ok(()),
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(tokens: &str) -> Result<Action> {
        Action::from_tokens(Path::new("cases"), tokens)
    }

    #[test]
    fn test_compile_variants() {
        assert!(matches!(compile("Reset"), Ok(Action::Reset)));
        assert!(matches!(
            compile("Select a000000151000000"),
            Ok(Action::Select { .. })
        ));
        assert!(matches!(
            compile("SendAPDU 00a4040000"),
            Ok(Action::SendApdu { .. })
        ));
        assert!(matches!(
            compile("InstallApplet a0000006270501 a000000627050101"),
            Ok(Action::InstallApplet { .. })
        ));
    }

    #[test]
    fn test_relative_cap_path_resolution() {
        match compile("LoadAndInstall applets/test.cap") {
            Ok(Action::LoadAndInstall { cap }) => {
                assert_eq!(cap, Path::new("cases/applets/test.cap"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        match compile("LoadCap /abs/test.cap") {
            Ok(Action::LoadCap { cap }) => assert_eq!(cap, Path::new("/abs/test.cap")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(matches!(
            compile("Frobnicate 1234"),
            Err(Error::UnknownAction(_))
        ));
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        // wrong arity
        assert!(matches!(compile("Reset now"), Err(Error::MalformedAction(_))));
        assert!(matches!(compile("Select"), Err(Error::MalformedAction(_))));
        assert!(matches!(
            compile("InstallApplet a0000006270501"),
            Err(Error::MalformedAction(_))
        ));
        // arguments that do not parse
        assert!(matches!(
            compile("Select zz"),
            Err(Error::MalformedAction(_))
        ));
        assert!(matches!(
            compile("SendAPDU 00"),
            Err(Error::MalformedAction(_))
        ));
    }

    #[test]
    fn test_nested_script_compilation() {
        let desc = ActionDesc::Sequence(vec![
            ActionDesc::Tokens("Reset".to_owned()),
            ActionDesc::Sequence(vec![ActionDesc::Tokens(
                "Select a000000151000000".to_owned(),
            )]),
        ]);
        let action = Action::compile(Path::new("."), &desc).unwrap();
        match action {
            Action::Script(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Action::Script(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
