//! Test fixtures for load run integration tests

use migradw_core::Config;
use migradw_warehouse::{ConnectionParams, SslMode};
use std::path::{Path, PathBuf};

/// Immigration extract: one exact duplicate row, one state with no
/// demographics
pub const IMMIGRATION_CSV: &str = "\
i94port,i94addr,visapost,entdepa,entdepd,gender,airline,admnum,fltno,visatype,month,year,cit,res,visa_code,age_respondent,birth_year,arrival_date,departure_date,arrival_type,date_form_added,admission_date,immi_id
SYD,CA,SYD,G,O,F,QF,55425779230,00011,B2,4,2016,438,438,2,40,1976,2016-04-01,2016-04-10,1,20160401,2016-10-01,1
SYD,CA,SYD,G,O,F,QF,55425779230,00011,B2,4,2016,438,438,2,40,1976,2016-04-01,2016-04-10,1,20160401,2016-10-01,1
NYC,NY,LND,T,O,M,BA,92513485030,00117,WT,4,2016,135,135,2,31,1985,2016-04-02,2016-04-20,1,20160402,2016-07-01,2
HOU,TX,MEX,G,O,M,AM,66613558130,00402,B1,4,2016,582,582,1,52,1964,2016-04-03,2016-04-08,3,20160403,2016-10-03,3
MIA,FL,BOG,Z,K,F,AV,12345678901,00020,B2,4,2016,129,129,2,27,1989,2016-04-05,2016-04-25,1,20160405,2016-10-05,4
";

/// City demographics aggregated per state and race
pub const DEMOGRAPHICS_CSV: &str = "\
race_count,male_population,female_population,total_population,total_veterans,total_foreign_born,state_code,race,avg_household_size,median_age
1200,50000,52000,102000,3000,20000,CA,Asian,2.8,34.5
800,40000,41000,81000,2500,15000,CA,White,2.6,38.1
500,30000,31000,61000,2000,9000,NY,Black or African-American,2.4,36.0
700,45000,44000,89000,2100,12000,TX,Hispanic or Latino,3.1,31.2
";

/// Check if PostgreSQL credentials and a server-readable fixture directory
/// are available
pub fn has_postgres_credentials() -> bool {
    std::env::var("PGHOST").is_ok() && std::env::var("MIGRADW_FIXTURE_DIR").is_ok()
}

/// Connection parameters from the standard libpq variables
pub fn postgres_params() -> ConnectionParams {
    ConnectionParams {
        host: std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
        database: std::env::var("PGDATABASE").unwrap_or_else(|_| "postgres".to_string()),
        user: std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
        password: std::env::var("PGPASSWORD").unwrap_or_default(),
        sslmode: SslMode::Disable,
    }
}

/// Write both CSV extracts into `dir`, returning their paths
pub fn write_csv_fixtures(dir: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let immigration = dir.join("immigration.csv");
    let demographics = dir.join("demographics.csv");
    std::fs::write(&immigration, IMMIGRATION_CSV)?;
    std::fs::write(&demographics, DEMOGRAPHICS_CSV)?;
    Ok((immigration, demographics))
}

/// Config for a local PostgreSQL run reading the given extracts
pub fn postgres_config(immigration: &Path, demographics: &Path) -> Config {
    let mut config = Config::new();
    config.set("dwh", "dialect", "postgres");
    config.set("s3", "immigration_data", immigration.display().to_string());
    config.set("s3", "demographics_data", demographics.display().to_string());
    config
}

/// Redshift config as found in a typical `dwh.toml`
pub const REDSHIFT_TOML: &str = r#"
[DWH]
host = "dwhcluster.example.ap-southeast-2.redshift.amazonaws.com"
dwh_db = "dwh"
dwh_db_user = "dwhuser"
dwh_db_password = "Passw0rd"
dwh_port = "5439"

[S3]
immigration_data = "'s3://capstone/immigration.csv'"
demographics_data = "'s3://capstone/demographics.csv'"

[IAM_ROLE]
arn = "'arn:aws:iam::123456789012:role/dwhRole'"
"#;

pub fn redshift_config() -> Config {
    Config::from_toml(REDSHIFT_TOML).expect("fixture config parses")
}
