//! Debian packages installed with apt

use super::default_true;
use crate::context::ApplyContext;
use crate::error::{Phase, Result};
use crate::resource::Resource;
use crate::types::ApplyResult;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashSet;

pub const KIND: &str = "apt";

/// Packages that must be installed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Apt {
    /// Package names, optionally pinned as `name=version`
    pub packages: Vec<String>,
    /// When false, every package must carry a version pin
    #[serde(default = "default_true")]
    pub allow_no_version: bool,
}

/// Name part of a `name=version` entry
fn package_name(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(name, _)| name)
}

fn is_pinned(entry: &str) -> bool {
    entry
        .split_once('=')
        .is_some_and(|(name, version)| !name.is_empty() && !version.is_empty())
}

/// `dpkg-query` output format: status word, then package name
const STATUS_FORMAT: &str = "-f=${db:Status-Status} ${Package}\n";

/// Parse `dpkg-query` lines of the form `<status> <package>`
fn parse_installed(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .filter_map(|line| line.split_once(' '))
        .filter(|(status, _)| *status == "installed")
        .map(|(_, name)| name.trim().to_string())
        .collect()
}

impl Apt {
    /// Entries whose package is not installed
    ///
    /// Only the name is compared, so a version pin takes effect when the
    /// package is installed and is not checked against an existing install.
    fn missing<'a>(&'a self, ctx: &ApplyContext) -> Vec<&'a str> {
        self.packages
            .iter()
            .map(String::as_str)
            .filter(|entry| !ctx.cache.is_installed(package_name(entry)))
            .collect()
    }

    fn load_installed(ctx: &ApplyContext) -> Result<HashSet<String>> {
        match ctx.run(Phase::Pre, "dpkg-query", &["-W", STATUS_FORMAT]) {
            Ok(output) => Ok(parse_installed(&output.stdout_str())),
            Err(e) if ctx.dry_run => {
                warn!("{}: cannot read installed packages, assuming none: {e}", ctx.resource);
                Ok(HashSet::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Ask dpkg which of the declared packages are installed right now
    ///
    /// dpkg-query exits non-zero when it knows nothing about a name, so the
    /// exit status is ignored and only the listing counts.
    fn query_installed(&self, ctx: &ApplyContext) -> Result<HashSet<String>> {
        let mut args = vec!["-W", STATUS_FORMAT];
        args.extend(self.packages.iter().map(|entry| package_name(entry)));
        let output = ctx.capture(Phase::Post, "dpkg-query", &args)?;
        Ok(parse_installed(&output.stdout_str()))
    }
}

impl Resource for Apt {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn describe(&self) -> String {
        if self.packages.is_empty() {
            "no packages".to_string()
        } else {
            format!("install {}", self.packages.join(", "))
        }
    }

    fn pre(&self, ctx: &ApplyContext) -> Result<()> {
        if !self.allow_no_version {
            let unpinned: Vec<&str> = self
                .packages
                .iter()
                .map(String::as_str)
                .filter(|entry| !is_pinned(entry))
                .collect();
            if !unpinned.is_empty() {
                return Err(ctx.fail(
                    Phase::Pre,
                    format!("packages without a version pin: {}", unpinned.join(", ")),
                ));
            }
        }

        if ctx.refresh_index && !ctx.dry_run {
            ctx.cache.refresh_once(|| {
                info!("refreshing package index");
                ctx.run_privileged(Phase::Pre, "apt-get", &["update"])
                    .map(|_| ())
            })?;
        }

        ctx.cache.ensure_loaded(|| Self::load_installed(ctx))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            let missing = self.missing(ctx);
            if missing.is_empty() {
                return Ok(ApplyResult::NoChange);
            }
            let prefix = if ctx.sudo { "sudo " } else { "" };
            return Ok(ApplyResult::Skipped {
                reason: format!("would run: {prefix}apt-get install -y {}", missing.join(" ")),
            });
        }

        // Recomputed under the lock: another resource may have installed
        // some of these packages meanwhile.
        ctx.cache.exclusive(|| -> Result<ApplyResult> {
            let missing = self.missing(ctx);
            if missing.is_empty() {
                debug!("{}: all packages already installed", ctx.resource);
                return Ok(ApplyResult::NoChange);
            }

            let mut args = vec!["install", "-y"];
            args.extend(&missing);
            ctx.run_privileged(Phase::Apply, "apt-get", &args)?;
            ctx.cache
                .mark_installed(missing.iter().copied().map(package_name));

            Ok(ApplyResult::Changed {
                detail: format!("installed {}", missing.join(", ")),
            })
        })
    }

    fn post(&self, ctx: &ApplyContext) -> Result<()> {
        if ctx.dry_run || self.packages.is_empty() {
            return Ok(());
        }
        let installed = self.query_installed(ctx)?;
        let missing: Vec<&str> = self
            .packages
            .iter()
            .map(String::as_str)
            .filter(|entry| !installed.contains(package_name(entry)))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ctx.fail(
                Phase::Post,
                format!("packages not installed: {}", missing.join(", ")),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CommandRunner, PackageCache};
    use crate::error::Error;
    use crate::types::{CommandOutput, ExecuteOptions};
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Records every command line and plays dpkg and apt-get
    ///
    /// Installs are appended to the dpkg listing unless `forget_installs`.
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<String>>,
        listing: Mutex<String>,
        fail_install: bool,
        forget_installs: bool,
        active_installs: AtomicUsize,
        peak_installs: AtomicUsize,
    }

    impl FakeRunner {
        fn with_listing(listing: &str) -> Self {
            Self {
                listing: Mutex::new(listing.to_string()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn install(&self, packages: &[&str]) -> CommandOutput {
            if self.fail_install {
                return CommandOutput::failed(100, "E: Unable to locate package nope");
            }
            let now = self.active_installs.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_installs.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            self.active_installs.fetch_sub(1, Ordering::SeqCst);

            if !self.forget_installs {
                let mut listing = self.listing.lock().unwrap();
                for entry in packages {
                    listing.push_str(&format!("installed {}\n", package_name(entry)));
                }
            }
            CommandOutput::ok("")
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput> {
            let line = std::iter::once(cmd)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(line);

            let (cmd, args) = match (cmd, args) {
                ("sudo", [inner, rest @ ..]) => (*inner, rest),
                _ => (cmd, args),
            };
            Ok(match (cmd, args) {
                ("dpkg-query", _) => CommandOutput::ok(self.listing.lock().unwrap().clone()),
                ("apt-get", ["install", "-y", packages @ ..]) => self.install(packages),
                _ => CommandOutput::ok(""),
            })
        }
    }

    fn apt(packages: &[&str]) -> Apt {
        Apt {
            packages: packages.iter().map(ToString::to_string).collect(),
            allow_no_version: true,
        }
    }

    #[test]
    fn installs_only_missing_packages() {
        let runner = FakeRunner::with_listing("installed curl\nconfig-files git\n");
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        let result = apt(&["curl", "git"]).converge(&ctx).unwrap();
        assert_eq!(
            result,
            ApplyResult::Changed {
                detail: "installed git".into()
            }
        );
        assert_eq!(runner.calls()[0], "apt-get update");
        assert!(runner.calls().contains(&"apt-get install -y git".to_string()));
        assert!(cache.is_installed("git"));
    }

    #[test]
    fn index_refresh_and_listing_happen_once_per_run() {
        let runner = FakeRunner::with_listing("installed curl\n");
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        apt(&["curl"]).converge(&ctx).unwrap();
        apt(&["curl"]).converge(&ctx).unwrap();

        let listing = format!("dpkg-query -W {STATUS_FORMAT}");
        let calls = runner.calls();
        assert_eq!(calls.iter().filter(|c| *c == "apt-get update").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == listing).count(), 1);
    }

    #[test]
    fn nothing_missing_is_no_change() {
        let runner = FakeRunner::with_listing("installed curl\n");
        let cache = PackageCache::seeded(["curl"]);
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        assert_eq!(apt(&["curl"]).converge(&ctx).unwrap(), ApplyResult::NoChange);
        assert!(!runner.calls().iter().any(|c| c.contains("apt-get")));
    }

    #[test]
    fn pins_only_apply_at_install_time() {
        let runner = FakeRunner::with_listing("installed git\n");
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        assert_eq!(
            apt(&["git=1:2.39"]).converge(&ctx).unwrap(),
            ApplyResult::NoChange
        );
        assert!(!runner.calls().iter().any(|c| c.contains("install")));
    }

    #[test]
    fn dry_run_reports_the_install_command() {
        let runner = FakeRunner::default();
        let cache = PackageCache::new();
        let opts = ExecuteOptions {
            dry_run: true,
            sudo: true,
            ..Default::default()
        };
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        let result = apt(&["curl", "git=1:2.39"]).converge(&ctx).unwrap();
        assert_eq!(
            result,
            ApplyResult::Skipped {
                reason: "would run: sudo apt-get install -y curl git=1:2.39".into()
            }
        );
        assert!(!runner.calls().iter().any(|c| c.contains("apt-get")));
    }

    #[test]
    fn sudo_prefixes_package_manager_commands() {
        let runner = FakeRunner::default();
        let cache = PackageCache::new();
        let opts = ExecuteOptions {
            sudo: true,
            ..Default::default()
        };
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        apt(&["curl"]).converge(&ctx).unwrap();
        let calls = runner.calls();
        assert!(calls.contains(&"sudo apt-get update".to_string()));
        assert!(calls.contains(&"sudo apt-get install -y curl".to_string()));
    }

    #[test]
    fn install_failure_carries_output() {
        let runner = FakeRunner {
            fail_install: true,
            ..Default::default()
        };
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        let err = apt(&["nope"]).converge(&ctx).unwrap_err();
        match err {
            Error::ResourceActionFailed { phase, output, .. } => {
                assert_eq!(phase, Phase::Apply);
                assert!(output.text().unwrap().contains("Unable to locate package"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn post_asks_dpkg_after_a_successful_install() {
        let runner = FakeRunner {
            forget_installs: true,
            ..Default::default()
        };
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        let err = apt(&["curl"]).converge(&ctx).unwrap_err();
        match err {
            Error::ResourceActionFailed { phase, message, .. } => {
                assert_eq!(phase, Phase::Post);
                assert_eq!(message, "packages not installed: curl");
            }
            other => panic!("unexpected error: {other}"),
        }
        let query = format!("dpkg-query -W {STATUS_FORMAT} curl");
        assert_eq!(runner.calls().last(), Some(&query));
    }

    #[test]
    fn parallel_installs_take_turns() {
        let runner = FakeRunner::default();
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();

        thread::scope(|scope| {
            for (name, package) in [("apt.update.web", "nginx"), ("apt.update.db", "postgresql")] {
                let (runner, cache, opts) = (&runner, &cache, &opts);
                scope.spawn(move || {
                    let ctx = ApplyContext::new(name, opts, runner, cache);
                    apt(&[package]).converge(&ctx).unwrap();
                });
            }
        });

        assert_eq!(runner.peak_installs.load(Ordering::SeqCst), 1);
        assert!(cache.is_installed("nginx"));
        assert!(cache.is_installed("postgresql"));
    }

    #[test]
    fn unpinned_packages_rejected_when_versions_required() {
        let runner = FakeRunner::default();
        let cache = PackageCache::new();
        let opts = ExecuteOptions::default();
        let ctx = ApplyContext::new("apt.update.base", &opts, &runner, &cache);

        let resource = Apt {
            packages: vec!["curl=7.88.1-10".into(), "git".into()],
            allow_no_version: false,
        };
        let err = resource.pre(&ctx).unwrap_err();
        assert!(err.to_string().contains("without a version pin: git"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn dpkg_listing_keeps_installed_only() {
        let set = parse_installed("installed curl\nconfig-files vim\nnot-installed git\n");
        assert!(set.contains("curl"));
        assert_eq!(set.len(), 1);
        assert_eq!(package_name("git=1:2.39"), "git");
    }
}
