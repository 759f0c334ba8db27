//! The workstation task list.
//!
//! Every feature is described as plain step data; nothing in here runs a
//! process itself.

use std::{path::Path, time::Duration};

use crate::models::{
    step::Step,
    task::{Action, Task},
};

const ESSENTIALS: &[&str] = &["zsh", "tmux", "ripgrep", "gd", "fzf", "git", "build-essential"];

const FLATPAK_APPS: &[&str] = &[
    "com.brave.Browser",
    "com.mattjakeman.ExtensionManager",
    "me.kozec.syncthingtk",
    "md.obsidian.Obsidian",
    "com.discordapp.Discord",
    "org.telegram.desktop",
    "com.getpostman.Postman",
    "it.fabiodistasio.AntaresSQL",
];

const HOME_DIRS: &[&str] = &[".config", "sb", "work"];

const NVM_INSTALLER: &str = "https://raw.githubusercontent.com/nvm-sh/nvm/v0.39.7/install.sh";
const OH_MY_ZSH_INSTALLER: &str =
    "https://raw.githubusercontent.com/ohmyzsh/ohmyzsh/master/tools/install.sh";
const NEOVIM_APPIMAGE: &str =
    "https://github.com/neovim/neovim/releases/latest/download/nvim.appimage";
const PACKER_REPO: &str = "https://github.com/wbthomason/packer.nvim";
const NVIM_CONFIG_REPO: &str = "https://github.com/oasido/nvim.git";
const POLYBAR_REPO: &str = "https://github.com/polybar/polybar.git";
const POLYBAR_EXAMPLE_CONFIG: &str = "/usr/local/share/doc/polybar/examples/config.ini";
const NVIM_PATH_EXPORT: &str = r#"export PATH="$PATH:/opt/nvim/""#;

const POLYBAR_BUILD_DEPS: &[&str] = &[
    "i3",
    "cmake",
    "cmake-data",
    "pkg-config",
    "python3-sphinx",
    "python3-packaging",
    "python3-xcbgen",
    "xcb-proto",
    "libuv1-dev",
    "libcairo2-dev",
    "libxcb1-dev",
    "libxcb-util0-dev",
    "libxcb-randr0-dev",
    "libxcb-composite0-dev",
    "libxcb-image0-dev",
    "libxcb-ewmh-dev",
    "libxcb-icccm4-dev",
    "libxcb-xkb-dev",
    "libxcb-xrm-dev",
    "libxcb-cursor-dev",
    "libasound2-dev",
    "libpulse-dev",
    "libjsoncpp-dev",
    "libmpdclient-dev",
    "libcurl4-openssl-dev",
    "libnl-genl-3-dev",
];

const POLYBAR_LAUNCH: &str = r#"#!/usr/bin/env bash
killall -q polybar
while pgrep -u "$UID" -x polybar >/dev/null; do sleep 1; done
polybar 2>&1 | tee -a /tmp/polybar.log & disown
"#;

const BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// All tasks in prompt order.
pub fn workstation_tasks(home: &Path) -> Vec<Task> {
    vec![
        Task::new("Install essential dependencies?", dependencies()),
        Task::new("Install programs through flatpak?", flatpak_programs()),
        Task::new("Install NVM & the latest Node LTS version?", nvm()),
        Task::new("Create directories?", directories(home)),
        Task::new("Install OhMyZsh?", oh_my_zsh()),
        Task::new("Install Neovim?", neovim(home)),
        Task::new("Install i3 & polybar?", i3(home)),
    ]
}

fn apt_install(packages: &[&str]) -> Step {
    let mut args = vec!["apt", "install", "-y"];
    args.extend_from_slice(packages);
    Step::exec("sudo", args)
}

fn dependencies() -> Action {
    Action::new(
        "dependencies",
        vec![
            Step::exec("sudo", ["apt", "update"]).describe("Updating package index"),
            Step::exec("sudo", ["apt", "upgrade", "-y"]).describe("Upgrading packages"),
            apt_install(ESSENTIALS).describe(format!("Installing {}", ESSENTIALS.join(" "))),
        ],
    )
}

fn flatpak_programs() -> Action {
    let steps = FLATPAK_APPS
        .iter()
        .map(|app| {
            Step::exec("flatpak", ["install", "-y", "flathub", *app])
                .describe(format!("Installing {}", app))
        })
        .collect();
    Action::new("flatpak", steps)
}

fn nvm() -> Action {
    let install_lts = r#"export NVM_DIR="$([ -z "${XDG_CONFIG_HOME-}" ] && printf %s "${HOME}/.nvm" || printf %s "${XDG_CONFIG_HOME}/nvm")"
[ -s "$NVM_DIR/nvm.sh" ] && \. "$NVM_DIR/nvm.sh"
nvm install --lts
"#;
    Action::new(
        "nvm",
        vec![
            Step::shell(format!("curl -o- {} | bash", NVM_INSTALLER)).describe("Installing NVM"),
            Step::shell(install_lts).describe("Installing the latest LTS Node version"),
        ],
    )
}

fn directories(home: &Path) -> Action {
    let steps = HOME_DIRS
        .iter()
        .map(|dir| {
            let path = home.join(dir);
            Step::create_dir(&path).describe(format!("Creating {}", path.display()))
        })
        .collect();
    Action::new("directories", steps)
}

fn oh_my_zsh() -> Action {
    Action::new(
        "ohmyzsh",
        vec![
            Step::exec("sudo", ["apt", "update"]).describe("Updating package index"),
            apt_install(&["zsh"]).describe("Installing zsh"),
            Step::shell(r#"sudo chsh -s "$(command -v zsh)" "$USER""#)
                .describe("Setting zsh as the login shell"),
            Step::shell(format!(
                r#"sh -c "$(curl -fsSL {})" "" --unattended"#,
                OH_MY_ZSH_INSTALLER
            ))
            .env("RUNZSH", "no")
            .env("CHSH", "no")
            .describe("Installing OhMyZsh"),
        ],
    )
}

fn neovim(home: &Path) -> Action {
    let config = home.join(".config").join("nvim");
    let config_dir = config.to_string_lossy().into_owned();
    let packer = home
        .join(".local/share/nvim/site/pack/packer/start/packer.nvim")
        .to_string_lossy()
        .into_owned();
    Action::new(
        "neovim",
        vec![
            Step::exec("curl", ["-LO", NEOVIM_APPIMAGE])
                .in_dir(home)
                .describe("Downloading the Neovim AppImage"),
            Step::exec("chmod", ["u+x", "nvim.appimage"]).in_dir(home),
            Step::exec("sudo", ["mkdir", "-p", "/opt/nvim"]),
            Step::exec("sudo", ["mv", "nvim.appimage", "/opt/nvim/nvim"]).in_dir(home),
            Step::ensure_line(home.join(".zshrc"), NVIM_PATH_EXPORT)
                .describe("Adding /opt/nvim to PATH in ~/.zshrc"),
            Step::exec("git", ["clone", "--depth", "1", PACKER_REPO, packer.as_str()])
                .describe("Cloning packer.nvim")
                .tolerate_failure(),
            Step::clear_dir(&config).describe("Clearing the existing Neovim configuration"),
            Step::exec("git", ["clone", NVIM_CONFIG_REPO, config_dir.as_str()])
                .describe("Cloning the Neovim configuration"),
        ],
    )
}

fn i3(home: &Path) -> Action {
    let source = home.join("sb").join("polybar");
    let build = source.join("build");
    let polybar_config = home.join(".config").join("polybar");
    let i3_config = home.join(".config").join("i3").join("config");
    let launch = polybar_config.join("launch.sh");
    let hook = format!("exec_always --no-startup-id \"{}\"", launch.display());
    let source_dir = source.to_string_lossy().into_owned();
    let config_ini = polybar_config.join("config.ini").to_string_lossy().into_owned();

    Action::new(
        "i3",
        vec![
            apt_install(POLYBAR_BUILD_DEPS)
                .describe("Installing i3 and polybar build dependencies"),
            Step::exec("git", ["clone", "--recursive", POLYBAR_REPO, source_dir.as_str()])
                .describe("Cloning polybar")
                .tolerate_failure(),
            Step::create_dir(&build),
            Step::exec("cmake", [".."])
                .in_dir(&build)
                .describe("Configuring polybar"),
            Step::shell("make -j\"$(nproc)\"")
                .in_dir(&build)
                .timeout(BUILD_TIMEOUT)
                .describe("Compiling polybar"),
            Step::exec("sudo", ["make", "install"])
                .in_dir(&build)
                .describe("Installing polybar"),
            Step::write_file(&launch, POLYBAR_LAUNCH)
                .mode(0o755)
                .describe("Writing the polybar launch script"),
            Step::exec("cp", [POLYBAR_EXAMPLE_CONFIG, config_ini.as_str()])
                .describe("Copying the example polybar configuration")
                .tolerate_failure(),
            Step::ensure_line(&i3_config, hook)
                .describe("Launching polybar from the i3 configuration"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use std::fs;

    use super::*;
    use crate::models::step::StepKind;
    use crate::worker::{
        executor::{Executor, ShellExecutor},
        signal::CancelToken,
    };

    fn home() -> PathBuf {
        PathBuf::from("/home/dev")
    }

    fn action(label: &str) -> Action {
        workstation_tasks(&home())
            .into_iter()
            .find(|task| task.label == label)
            .map(|task| task.action)
            .unwrap()
    }

    #[test]
    fn tasks_are_listed_in_prompt_order() {
        let labels: Vec<String> = workstation_tasks(&home())
            .into_iter()
            .map(|task| task.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "Install essential dependencies?",
                "Install programs through flatpak?",
                "Install NVM & the latest Node LTS version?",
                "Create directories?",
                "Install OhMyZsh?",
                "Install Neovim?",
                "Install i3 & polybar?",
            ]
        );
    }

    #[test]
    fn flatpak_installs_one_application_per_step() {
        let flatpak = action("Install programs through flatpak?");
        assert_eq!(flatpak.steps.len(), FLATPAK_APPS.len());
        assert_eq!(
            flatpak.steps[3].kind,
            StepKind::Exec {
                program: "flatpak".into(),
                args: vec![
                    "install".into(),
                    "-y".into(),
                    "flathub".into(),
                    "md.obsidian.Obsidian".into(),
                ],
            }
        );
    }

    #[test]
    fn directories_live_under_home() {
        let kinds: Vec<StepKind> = action("Create directories?")
            .steps
            .into_iter()
            .map(|step| step.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::CreateDir("/home/dev/.config".into()),
                StepKind::CreateDir("/home/dev/sb".into()),
                StepKind::CreateDir("/home/dev/work".into()),
            ]
        );
    }

    #[test]
    fn polybar_is_built_from_source_in_its_build_dir() {
        let steps = action("Install i3 & polybar?").steps;
        let build = PathBuf::from("/home/dev/sb/polybar/build");

        let position = |description: &str| {
            steps
                .iter()
                .position(|step| step.description == description)
                .unwrap()
        };
        let clone = position("Cloning polybar");
        let configure = position("Configuring polybar");
        let compile = position("Compiling polybar");
        let install = position("Installing polybar");
        assert!(clone < configure && configure < compile && compile < install);

        for index in [configure, compile, install] {
            assert_eq!(steps[index].working_dir.as_ref(), Some(&build));
        }
        assert_eq!(steps[compile].timeout, Some(BUILD_TIMEOUT));
        assert!(steps[clone].tolerate_failure);
    }

    #[test]
    fn polybar_launch_script_is_executable() {
        let steps = action("Install i3 & polybar?").steps;
        assert!(steps.iter().any(|step| step.kind
            == StepKind::WriteFile {
                path: "/home/dev/.config/polybar/launch.sh".into(),
                contents: POLYBAR_LAUNCH.into(),
                mode: Some(0o755),
            }));
    }

    #[test]
    fn neovim_config_is_cloned_into_config_dir() {
        let steps = action("Install Neovim?").steps;
        let last = steps.last().unwrap();
        assert_eq!(
            last.kind,
            StepKind::Exec {
                program: "git".into(),
                args: vec![
                    "clone".into(),
                    NVIM_CONFIG_REPO.into(),
                    "/home/dev/.config/nvim".into(),
                ],
            }
        );
    }

    fn run_step(action: &Action, description: &str) {
        let step = action
            .steps
            .iter()
            .find(|step| step.description == description)
            .unwrap();
        ShellExecutor::new("/bin/sh", None)
            .execute(step, &CancelToken::default())
            .unwrap();
    }

    #[test]
    fn neovim_reset_stays_inside_config_dir_when_home_has_spaces() {
        let root = tempfile::tempdir().unwrap();
        let sibling = root.path().join("my").join("precious");
        fs::create_dir_all(&sibling).unwrap();
        let home = root.path().join("my user");
        let config = home.join(".config").join("nvim");
        fs::create_dir_all(config.join("lua")).unwrap();
        fs::write(config.join("init.lua"), "-- old").unwrap();

        run_step(&neovim(&home), "Clearing the existing Neovim configuration");

        assert!(sibling.is_dir());
        assert!(config.is_dir());
        assert_eq!(fs::read_dir(&config).unwrap().count(), 0);
    }

    #[test]
    fn neovim_reset_removes_previous_clone_so_clone_can_rerun() {
        let root = tempfile::tempdir().unwrap();
        let config = root.path().join(".config").join("nvim");
        fs::create_dir_all(config.join(".git").join("refs")).unwrap();
        fs::write(config.join(".git").join("HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(config.join("init.lua"), "-- old").unwrap();

        run_step(&neovim(root.path()), "Clearing the existing Neovim configuration");

        assert_eq!(fs::read_dir(&config).unwrap().count(), 0);
    }

    #[test]
    fn oh_my_zsh_refreshes_index_and_runs_unattended() {
        let steps = action("Install OhMyZsh?").steps;
        assert_eq!(
            steps[0].kind,
            StepKind::Exec {
                program: "sudo".into(),
                args: vec!["apt".into(), "update".into()],
            }
        );
        let installer = steps.last().unwrap();
        assert!(installer.env.contains(&("RUNZSH".to_string(), "no".to_string())));
        assert!(installer.env.contains(&("CHSH".to_string(), "no".to_string())));
    }

    #[test]
    fn i3_hook_is_added_once_with_quoted_path() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("my user");
        let window_manager = i3(&home);

        run_step(&window_manager, "Launching polybar from the i3 configuration");
        run_step(&window_manager, "Launching polybar from the i3 configuration");

        let config = fs::read_to_string(home.join(".config/i3/config")).unwrap();
        let expected = format!(
            "exec_always --no-startup-id \"{}\"\n",
            home.join(".config/polybar/launch.sh").display()
        );
        assert_eq!(config, expected);
    }
}
