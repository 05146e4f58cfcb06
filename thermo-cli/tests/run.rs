use assert_cmd::Command;
use assert_fs::fixture::{FileWriteStr, NamedTempFile};
use predicates::str::contains;

/// A small, fast-converging configuration: `z_initial` well above the helium epoch but far
/// short of the teacher-scale defaults, reionization turned off so the run never enters the
/// tau_reio bisection (§4.6).
const CONFIG_YAML: &str = "
background:
  h: 0.6736
  omega_cdm_h2: 0.1200
thermo:
  t_cmb: 2.7255
  omega_b_h2: 0.02237
  y_he:
    Fixed: 0.2454
  n_eff: 3.046
  recombination: R
  reio_parametrization: None
  reio_target:
    Redshift: 0.0
  compute_damping_scale: false
  compute_cb2_derivatives: false
  grid:
    z_initial: 6000.0
    z_linear: 2000.0
    reionization_z_start_max: 50.0
    n_log: 10
    n_lin: 10
    n_reio: 5
  precision:
    z_h_limit: 1600.0
    z_he2_limit: 2870.0
    transition_width: 50.0
    tol_tau: 0.0001
    max_bisection_iterations: 40
    ode_tolerance: 0.000001
    peebles_trigger: 0.99
    tight_coupling_trigger: 0.001
    rate_smoothing_radius: 3
";

fn config_file() -> NamedTempFile {
    let file = NamedTempFile::new("config.yaml").unwrap();
    file.write_str(CONFIG_YAML).unwrap();
    file
}

#[test]
fn run_prints_the_scalar_summary() {
    let config = config_file();
    Command::cargo_bin("thermo")
        .unwrap()
        .args(["run"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(contains("z_rec"))
        .stdout(contains("z_d"))
        .stdout(contains("z_reio"))
        .stdout(contains("tau_reio"))
        .stdout(contains("r_s_rec"))
        .stdout(contains("r_s_d"))
        .stdout(contains("d_a_rec"));
}

#[test]
fn run_rejects_a_missing_config_file() {
    Command::cargo_bin("thermo")
        .unwrap()
        .args(["run", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(contains("does-not-exist.yaml"));
}

#[test]
fn run_rejects_z_initial_below_the_helium_epoch() {
    let config = config_file();
    config
        .write_str(&CONFIG_YAML.replace("z_initial: 6000.0", "z_initial: 10.0"))
        .unwrap();
    Command::cargo_bin("thermo")
        .unwrap()
        .arg("run")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(contains("z_initial"));
}
