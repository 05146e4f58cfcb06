use assert_cmd::Command;
use assert_fs::fixture::{FileWriteStr, NamedTempFile};
use predicates::prelude::*;
use predicates::str::contains;

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
fn table_csv_header_lists_every_column() {
    let config = config_file();
    Command::cargo_bin("thermo")
        .unwrap()
        .args(["table", "--format", "csv"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(contains("z,tau,x_e,dkappa"))
        .stdout(contains("g,dg,ddg,t_b,cb2,tau_d"));
}

#[test]
fn table_json_is_an_array_of_rows() {
    let config = config_file();
    Command::cargo_bin("thermo")
        .unwrap()
        .args(["table", "--format", "json"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(contains("\"x_e\""))
        .stdout(contains("\"dkappa\""));
}

#[test]
fn table_writes_to_the_requested_output_file() {
    let config = config_file();
    let output = NamedTempFile::new("table.csv").unwrap();
    Command::cargo_bin("thermo")
        .unwrap()
        .arg("table")
        .arg(config.path())
        .arg("--output")
        .arg(output.path())
        .assert()
        .success()
        .stdout(contains("z,tau").not());

    let written = std::fs::read_to_string(output.path()).unwrap();
    assert!(written.starts_with("z,tau,x_e,dkappa"));
}
