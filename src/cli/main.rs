use certprov::certificate::{self, SERIAL_BUFFER_CAPACITY};
use certprov::config::DeviceConfig;
use certprov::provisioning::{HostAccessPoint, ProvisioningSession, TcpHttpListener};
use certprov::storage::{FileNamespace, IdentityStore};
use certprov::time::{SystemTimeSource, TimeSource};
use certprov::transport::PemBundle;
use certprov::wifi::{NamespaceCredentialStore, WIFI_NAMESPACE};
use certprov::{CPError, CertificateManager, ExpiryStatus, LifecycleState, ServerVerification};

use certprov::reexports::log;
use certprov::reexports::zeroize::Zeroizing;

use clap::{crate_description, crate_name, crate_version, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Read a PEM file with a helpful error message
fn read_pem(path: &str) -> Result<String, CPError> {
    std::fs::read_to_string(path)
        .map_err(|e| CPError::InternalError(format!("Failed to read '{}': {}", path, e)))
}

fn required<'a>(matches: &'a ArgMatches, id: &str, what: &'static str) -> Result<&'a str, CPError> {
    matches
        .get_one::<String>(id)
        .map(|s| s.as_str())
        .ok_or(CPError::UsageError(what))
}

fn parse_mac(text: &str) -> Result<[u8; 6], CPError> {
    let mut mac = [0u8; 6];
    let parts: Vec<&str> = text.split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(CPError::UsageError("MAC address must have six octets"));
    }
    for (byte, part) in mac.iter_mut().zip(parts) {
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| CPError::UsageError("Invalid MAC address octet"))?;
    }
    Ok(mac)
}

fn format_expiry(expires_at: u64) -> String {
    if expires_at == 0 {
        "unknown".to_string()
    } else {
        format!("{} (unix)", expires_at)
    }
}

fn open_manager(config: &DeviceConfig, clock: Arc<dyn TimeSource>) -> Result<CertificateManager, CPError> {
    let namespace = FileNamespace::open(&config.storage_dir, &config.manager.namespace)?;
    let mut manager = CertificateManager::new(
        IdentityStore::new(Box::new(namespace)),
        clock,
        config.manager.clone(),
    );
    manager.begin()?;
    Ok(manager)
}

fn pem_arg(id: &'static str, long: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(id)
        .value_name("file")
        .long(long)
        .short(short)
        .required(true)
        .help(help)
}

fn start() -> Result<(), CPError> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("debug")
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Prints debugging information"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("config_file")
                .help("Device configuration (JSON)"),
        )
        .arg(
            Arg::new("storage_dir")
                .long("storage-dir")
                .short('s')
                .value_name("dir")
                .help("Directory holding the identity namespaces (overrides the config file)"),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the identity fields of a certificate")
                .arg(pem_arg("cert", "cert", 'i', "Certificate (PEM)")),
        )
        .subcommand(
            Command::new("check-pair")
                .about("Check that a private key belongs to a certificate")
                .arg(pem_arg("cert", "cert", 'i', "Certificate (PEM)"))
                .arg(pem_arg("key", "key", 'k', "Private key (PEM)")),
        )
        .subcommand(
            Command::new("store")
                .about("Validate and store a device identity")
                .arg(pem_arg("cert", "cert", 'i', "Client certificate (PEM)"))
                .arg(pem_arg("key", "key", 'k', "Client private key (PEM)"))
                .arg(
                    Arg::new("ca")
                        .value_name("file")
                        .long("ca")
                        .help("CA certificate chain (PEM)"),
                ),
        )
        .subcommand(Command::new("status").about("Show the stored identity and its validity"))
        .subcommand(
            Command::new("export")
                .about("Write the validated identity out as PEM files")
                .arg(
                    Arg::new("out_dir")
                        .value_name("dir")
                        .long("out-dir")
                        .short('o')
                        .required(true)
                        .help("Output directory"),
                ),
        )
        .subcommand(
            Command::new("clear")
                .about("Erase the stored identity")
                .arg(
                    Arg::new("wifi")
                        .long("wifi")
                        .action(ArgAction::SetTrue)
                        .help("Also erase stored WiFi credentials"),
                ),
        )
        .subcommand(
            Command::new("provision")
                .about("Run a provisioning session serving the form over HTTP")
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_name("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("HTTP port (default from config: 80)"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .short('t')
                        .value_name("seconds")
                        .value_parser(clap::value_parser!(u64))
                        .help("Give up after this many seconds (default from config: 300)"),
                )
                .arg(
                    Arg::new("mac")
                        .long("mac")
                        .value_name("hardware_id")
                        .default_value("02:00:00:00:00:01")
                        .help("Hardware id used for the SSID suffix"),
                ),
        )
        .get_matches();

    let debug = matches.get_flag("debug");

    env_logger::builder()
        .format_timestamp(None)
        .format_level(false)
        .format_module_path(false)
        .format_target(false)
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => DeviceConfig::load(Path::new(path))?,
        None => DeviceConfig::default(),
    };
    if let Some(dir) = matches.get_one::<String>("storage_dir") {
        config.storage_dir = PathBuf::from(dir);
    }
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);

    if let Some(matches) = matches.subcommand_matches("inspect") {
        let cert = read_pem(required(matches, "cert", "Missing certificate file")?)?;
        let cn = certificate::extract_common_name(&cert)?;
        println!("Common Name:  {}", cn);
        match certificate::extract_serial(&cert, SERIAL_BUFFER_CAPACITY) {
            Ok(serial) => println!("Serial:       {}", serial),
            Err(e) => println!("Serial:       unavailable ({})", e),
        }
        match certificate::extract_expiration(&cert) {
            Ok(expires_at) => println!("Expires:      {}", format_expiry(expires_at)),
            Err(e) => println!("Expires:      unavailable ({})", e),
        }
        if let Some(info) = certificate::describe(&cert) {
            println!("{}", info);
        }
    } else if let Some(matches) = matches.subcommand_matches("check-pair") {
        let cert = read_pem(required(matches, "cert", "Missing certificate file")?)?;
        let key = read_pem(required(matches, "key", "Missing key file")?)?;
        let algorithm = certificate::check_key_pair(&cert, &key)?;
        println!("Key pair matches ({})", algorithm);
    } else if let Some(matches) = matches.subcommand_matches("store") {
        let cert = read_pem(required(matches, "cert", "Missing certificate file")?)?;
        let key = Zeroizing::new(read_pem(required(matches, "key", "Missing key file")?)?);
        let ca = match matches.get_one::<String>("ca") {
            Some(path) => Some(read_pem(path)?),
            None => None,
        };
        let mut manager = open_manager(&config, clock)?;
        manager.store_certificates(&cert, &key, ca.as_deref())?;
        println!(
            "Stored identity [{}] (version {})",
            manager.sensor_name(),
            manager.version()
        );
    } else if matches.subcommand_matches("status").is_some() {
        let mut manager = open_manager(&config, clock)?;
        match manager.state().clone() {
            LifecycleState::Absent | LifecycleState::Uninitialized => {
                println!("No identity provisioned");
                return Ok(());
            }
            LifecycleState::Invalid { reason } => println!("State:        invalid ({})", reason),
            LifecycleState::Provisioned => println!("State:        provisioned"),
        }
        println!("Sensor name:  {}", manager.sensor_name());
        println!("Serial:       {}", manager.serial_number());
        println!("Expires:      {}", format_expiry(manager.expires_at()));
        println!("Version:      {}", manager.version());
        println!("CA chain:     {}", if manager.has_ca_cert() { "yes" } else { "no" });
        if manager.is_provisioned() {
            match manager.validate_certificates()? {
                ExpiryStatus::Valid { days_remaining } => {
                    println!("Validity:     {} days remaining", days_remaining)
                }
                ExpiryStatus::ExpiringSoon { days_remaining } => {
                    println!("Validity:     EXPIRING in {} days", days_remaining)
                }
                ExpiryStatus::Unknown => println!("Validity:     unknown"),
                ExpiryStatus::Deferred => println!("Validity:     not checked (clock not set)"),
            }
        }
    } else if let Some(matches) = matches.subcommand_matches("export") {
        let out_dir = PathBuf::from(required(matches, "out_dir", "Missing output directory")?);
        let mut manager = open_manager(&config, clock)?;
        let mut bundle = PemBundle::new();
        let verification = manager.load_certificates_into(&mut bundle)?;
        std::fs::create_dir_all(&out_dir)?;
        if let Some(cert) = &bundle.certificate {
            certprov::secure_file::write_atomic(&out_dir.join("client.crt"), cert.as_bytes())?;
        }
        if let Some(key) = &bundle.private_key {
            certprov::secure_file::write_atomic(&out_dir.join("client.key"), key.as_bytes())?;
        }
        if let Some(ca) = &bundle.ca_cert {
            certprov::secure_file::write_atomic(&out_dir.join("ca.crt"), ca.as_bytes())?;
        }
        println!("Identity [{}] written to [{}]", manager.sensor_name(), out_dir.display());
        if verification == ServerVerification::Disabled {
            println!("No CA chain stored: the broker certificate will not be verified");
        }
    } else if let Some(matches) = matches.subcommand_matches("clear") {
        let mut manager = open_manager(&config, clock)?;
        manager.clear_certificates()?;
        println!("Identity cleared");
        if matches.get_flag("wifi") {
            let wifi = NamespaceCredentialStore::new(Box::new(FileNamespace::open(
                &config.storage_dir,
                WIFI_NAMESPACE,
            )?));
            wifi.clear()?;
            println!("WiFi credentials cleared");
        }
    } else if let Some(matches) = matches.subcommand_matches("provision") {
        let mut prov_config = config.provisioning.clone();
        if let Some(port) = matches.get_one::<u16>("port") {
            prov_config.http_port = *port;
        }
        if let Some(timeout) = matches.get_one::<u64>("timeout") {
            prov_config.session_timeout_secs = *timeout;
        }
        let mac = parse_mac(required(matches, "mac", "Missing hardware id")?)?;
        let timeout = prov_config.session_timeout();

        let mut manager = open_manager(&config, clock.clone())?;
        if manager.is_provisioned() {
            log::info!(
                "Device already provisioned as [{}]; a submission will replace it",
                manager.sensor_name()
            );
        }
        let wifi = NamespaceCredentialStore::new(Box::new(FileNamespace::open(
            &config.storage_dir,
            WIFI_NAMESPACE,
        )?));

        let mut session = ProvisioningSession::new(
            prov_config,
            Box::new(HostAccessPoint::new(mac)),
            Box::new(TcpHttpListener::new()),
            clock,
        )
        .with_credential_store(Box::new(wifi));
        session.start()?;

        loop {
            let pump = session.pump(&mut manager)?;
            if pump.restart_due {
                session.stop();
                println!(
                    "Provisioned [{}] (version {}); restart requested",
                    manager.sensor_name(),
                    manager.version()
                );
                break;
            }
            if session.elapsed() >= timeout {
                session.time_out();
                session.stop();
                return Err(CPError::InternalError(format!(
                    "Provisioning timed out after {} seconds",
                    timeout.as_secs()
                )));
            }
            if pump.served.is_none() {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    } else {
        return Err(CPError::UsageError("No subcommand specified"));
    }
    Ok(())
}

fn main() -> Result<(), CPError> {
    let res = start();
    match res {
        Ok(_) => {}
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
