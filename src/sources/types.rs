use serde::Deserialize;

/// Response from E-utilities `esearch.fcgi?retmode=json`.
#[derive(Deserialize, Debug)]
pub struct ESearchResponse {
    pub esearchresult: Option<ESearchResult>,
}

#[derive(Deserialize, Debug)]
pub struct ESearchResult {
    pub idlist: Option<Vec<String>>,
    #[serde(rename = "ERROR")]
    pub error: Option<String>,
}

/// Response from Europe PMC `search?format=json&resultType=core`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EuropePmcResponse {
    pub hit_count: Option<u64>,
    pub result_list: Option<ResultList>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ResultList {
    #[serde(default)]
    pub result: Vec<EuropePmcRecord>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct EuropePmcRecord {
    pub id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub author_string: Option<String>,
    pub author_list: Option<AuthorList>,
    pub first_publication_date: Option<String>,
    pub pub_year: Option<String>,
    pub is_open_access: Option<String>,
    pub journal_info: Option<JournalInfo>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AuthorList {
    #[serde(default)]
    pub author: Vec<AuthorEntry>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthorEntry {
    pub full_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct JournalInfo {
    pub journal: Option<JournalEntry>,
}

#[derive(Deserialize, Debug, Default)]
pub struct JournalEntry {
    pub title: Option<String>,
}
