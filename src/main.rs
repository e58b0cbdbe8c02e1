use tracing::info;
use tracing_subscriber::EnvFilter;

use typewright::config::Settings;
use typewright::construct::TypeBody;
use typewright::database::Database;
use typewright::error::TypewrightError;

/// Opens the configured project and prints its schema in emission order,
/// followed by the contents of every data store.
fn main() -> Result<(), TypewrightError> {
    let config_file = std::env::args().nth(1);
    let settings = Settings::load(config_file.as_deref())?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!(project = %settings.project, directory = ?settings.directory, "starting");

    let database = Database::new(settings.persistence_mode())?;
    let registry = database.registry();
    for handle in database.emission_order() {
        let definition = registry.definition(handle)?;
        let base = definition
            .base_type()
            .map(|base| format!(" : {}", registry.render(base)))
            .unwrap_or_default();
        println!("{} {}{}", definition.variant(), definition.name(), base);
        match definition.body() {
            TypeBody::Struct(record) | TypeBody::Class(record) => {
                for field in &record.fields {
                    println!("    {} {};", registry.render(&field.field_type), field.name);
                }
            }
            TypeBody::Enum(enumeration) => {
                for (enumerator, value) in enumeration.enumerators.iter().zip(enumeration.values()) {
                    println!("    {} = {},", enumerator.name, value);
                }
            }
            TypeBody::BuiltIn(_) => {}
        }
    }
    for store in database.stores() {
        println!("store {} ({} roots)", store.name(), store.len());
        for root in store.roots().keys() {
            if let Some(described) = database.describe_root(store.name(), root) {
                println!("    {} = {}", root, described);
            }
        }
    }
    Ok(())
}
