use clap::App;
use clap::Arg;

#[tokio::main(flavor = "multi_thread", worker_threads = 3)]
async fn main() {
    let matches = App::new("Fixgate")
        .version("0.0.1")
        .author("jcm")
        .about("FIX gateway with a Raft-replicated cluster of engines.")
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("PATH")
                .required(true)
                .default_value("Config.toml")
                .help("Location of the config file."),
        )
        .arg(
            Arg::with_name("role")
                .long("role")
                .value_name("ROLE")
                .possible_values(&["engine", "library"])
                .default_value("engine")
                .help("Whether this process runs as an engine or a library."),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap();
    let role = matches.value_of("role").unwrap().parse().unwrap();
    fixgate::fixgate(config_path, role).await.unwrap();
}
