use serde::{Deserialize, Deserializer, Serialize};

/// Minimal search-result record returned by `/movies/search`. The `imdb_id`
/// is the only stable identifier and doubles as the enrichment cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieStub {
    #[serde(rename = "imdbID")]
    pub imdb_id: String,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub poster: String,
    #[serde(default, rename = "imdbRating", deserialize_with = "lenient_float")]
    pub imdb_rating: Option<f64>,
    #[serde(default)]
    pub classification: Option<String>,
}

/// Full record returned by `/movies/data/{imdbID}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub runtime: Option<i32>,
    #[serde(default)]
    pub plot: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub poster: String,
    #[serde(default)]
    pub boxoffice: Option<i64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub principals: Vec<Principal>,
    #[serde(default, rename = "imdbRating", deserialize_with = "lenient_float")]
    pub imdb_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub source: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDetail {
    pub name: String,
    #[serde(default, rename = "birthYear")]
    pub birth_year: Option<i32>,
    #[serde(default, rename = "deathYear")]
    pub death_year: Option<i32>,
    #[serde(default)]
    pub roles: Vec<PersonRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRole {
    #[serde(default, rename = "movieId")]
    pub movie_id: String,
    #[serde(default, rename = "movieName")]
    pub movie_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default, rename = "imdbRating", deserialize_with = "lenient_float")]
    pub imdb_rating: Option<f64>,
}

/// A stub merged with its detail record. Detail fields win where both carry a
/// value; the stub fields are always retained so a failed detail fetch still
/// renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMovie {
    pub stub: MovieStub,
    #[serde(default)]
    pub detail: Option<MovieDetail>,
}

impl From<MovieStub> for EnrichedMovie {
    fn from(stub: MovieStub) -> Self {
        Self { stub, detail: None }
    }
}

impl EnrichedMovie {
    pub fn merged(stub: MovieStub, detail: MovieDetail) -> Self {
        Self {
            stub,
            detail: Some(detail),
        }
    }

    pub fn imdb_id(&self) -> &str {
        &self.stub.imdb_id
    }

    pub fn title(&self) -> &str {
        match &self.detail {
            Some(detail) if !detail.title.is_empty() => &detail.title,
            _ => &self.stub.title,
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.detail
            .as_ref()
            .and_then(|detail| detail.year)
            .or(self.stub.year)
    }

    pub fn imdb_rating(&self) -> Option<f64> {
        self.detail
            .as_ref()
            .and_then(|detail| detail.imdb_rating)
            .or(self.stub.imdb_rating)
    }

    pub fn genres(&self) -> &[String] {
        self.detail
            .as_ref()
            .map(|detail| detail.genres.as_slice())
            .unwrap_or(&[])
    }

    pub fn rating(&self, source: RatingSource) -> Option<&str> {
        let detail = self.detail.as_ref()?;
        detail
            .ratings
            .iter()
            .find(|rating| rating.source == source.wire_name())
            .map(|rating| rating.value.as_str())
    }
}

/// Rating providers the API reports, keyed by their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatingSource {
    Imdb,
    RottenTomatoes,
    Metacritic,
}

impl RatingSource {
    pub const ALL: [RatingSource; 3] = [
        RatingSource::Imdb,
        RatingSource::RottenTomatoes,
        RatingSource::Metacritic,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            RatingSource::Imdb => "Internet Movie Database",
            RatingSource::RottenTomatoes => "Rotten Tomatoes",
            RatingSource::Metacritic => "Metacritic",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RatingSource::Imdb => "IMDb",
            RatingSource::RottenTomatoes => "Rotten",
            RatingSource::Metacritic => "Metacritic",
        }
    }
}

/// The curated genre filters the catalog exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Drama,
    Horror,
    Comedy,
    SciFi,
    Romance,
    Thriller,
    Crime,
}

impl Genre {
    pub const ALL: [Genre; 8] = [
        Genre::Action,
        Genre::Drama,
        Genre::Horror,
        Genre::Comedy,
        Genre::SciFi,
        Genre::Romance,
        Genre::Thriller,
        Genre::Crime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Drama => "Drama",
            Genre::Horror => "Horror",
            Genre::Comedy => "Comedy",
            Genre::SciFi => "Sci-Fi",
            Genre::Romance => "Romance",
            Genre::Thriller => "Thriller",
            Genre::Crime => "Crime",
        }
    }

    pub fn parse(value: &str) -> Option<Genre> {
        let trimmed = value.trim();
        Genre::ALL
            .iter()
            .copied()
            .find(|genre| genre.as_str().eq_ignore_ascii_case(trimmed))
    }

    /// Case-insensitive membership test against a movie's genre list. Genre
    /// lists arrive either pre-split or as one comma-separated string.
    pub fn matches(&self, genres: &[String]) -> bool {
        genres.iter().any(|entry| {
            entry
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(self.as_str()))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    TitleAsc,
    TitleDesc,
    RatingDesc,
    YearDesc,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::TitleAsc => "A-Z",
            SortKey::TitleDesc => "Z-A",
            SortKey::RatingDesc => "IMDb Rating",
            SortKey::YearDesc => "Year",
        }
    }
}

/// Client-side filters applied to the held result set. Matching never touches
/// the underlying fetched list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub year: Option<i32>,
    pub genre: Option<Genre>,
    pub min_rating: Option<f64>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.genre.is_none() && self.min_rating.is_none()
    }

    pub fn matches(&self, movie: &EnrichedMovie) -> bool {
        if let Some(year) = self.year {
            if movie.year() != Some(year) {
                return false;
            }
        }
        if let Some(genre) = self.genre {
            if !genre.matches(movie.genres()) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            match movie.imdb_rating() {
                Some(rating) if rating >= min => {}
                _ => return false,
            }
        }
        true
    }
}

/// Builds the derived display list: filter first (preserving relative order),
/// then sort when requested.
pub fn apply_sort_and_filter(
    movies: &[EnrichedMovie],
    filters: &Filters,
    sort: Option<SortKey>,
) -> Vec<EnrichedMovie> {
    let mut display: Vec<EnrichedMovie> = movies
        .iter()
        .filter(|movie| filters.matches(movie))
        .cloned()
        .collect();

    match sort {
        Some(SortKey::TitleAsc) => display.sort_by(|a, b| a.title().cmp(b.title())),
        Some(SortKey::TitleDesc) => display.sort_by(|a, b| b.title().cmp(a.title())),
        Some(SortKey::RatingDesc) => display.sort_by(|a, b| {
            let left = a.imdb_rating().unwrap_or(0.0);
            let right = b.imdb_rating().unwrap_or(0.0);
            right.partial_cmp(&left).unwrap_or(std::cmp::Ordering::Equal)
        }),
        Some(SortKey::YearDesc) => {
            display.sort_by(|a, b| b.year().unwrap_or(0).cmp(&a.year().unwrap_or(0)))
        }
        None => {}
    }

    display
}

const CURATED_ROW_LIMIT: usize = 10;

/// Home-page rows derived from the first curated page.
pub fn top_rated(movies: &[EnrichedMovie]) -> Vec<EnrichedMovie> {
    movies
        .iter()
        .filter(|movie| movie.imdb_rating().unwrap_or(0.0) >= 7.6)
        .take(CURATED_ROW_LIMIT)
        .cloned()
        .collect()
}

pub fn horror_picks(movies: &[EnrichedMovie]) -> Vec<EnrichedMovie> {
    movies
        .iter()
        .filter(|movie| Genre::Horror.matches(movie.genres()))
        .take(CURATED_ROW_LIMIT)
        .cloned()
        .collect()
}

pub fn childrens_picks(movies: &[EnrichedMovie]) -> Vec<EnrichedMovie> {
    movies
        .iter()
        .filter(|movie| {
            matches!(
                movie.stub.classification.as_deref(),
                Some("G") | Some("PG")
            )
        })
        .take(CURATED_ROW_LIMIT)
        .cloned()
        .collect()
}

// Ratings arrive as "96%", "7.8", or bare numbers depending on the source.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected rating value: {other}"
        ))),
    }
}

fn lenient_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(id: &str, title: &str, year: i32, rating: f64) -> MovieStub {
        MovieStub {
            imdb_id: id.to_string(),
            title: title.to_string(),
            year: Some(year),
            poster: String::new(),
            imdb_rating: Some(rating),
            classification: None,
        }
    }

    fn enriched(id: &str, title: &str, year: i32, rating: f64, genres: &[&str]) -> EnrichedMovie {
        let detail = MovieDetail {
            title: title.to_string(),
            year: Some(year),
            runtime: None,
            plot: String::new(),
            country: String::new(),
            poster: String::new(),
            boxoffice: None,
            genres: genres.iter().map(|genre| genre.to_string()).collect(),
            ratings: Vec::new(),
            principals: Vec::new(),
            imdb_rating: Some(rating),
        };
        EnrichedMovie::merged(stub(id, title, year, rating), detail)
    }

    #[test]
    fn detail_fields_win_on_merge() {
        let base = stub("tt1", "stub title", 1999, 5.0);
        let detail = MovieDetail {
            title: "detail title".to_string(),
            year: Some(2001),
            runtime: Some(120),
            plot: String::new(),
            country: String::new(),
            poster: String::new(),
            boxoffice: None,
            genres: Vec::new(),
            ratings: Vec::new(),
            principals: Vec::new(),
            imdb_rating: Some(8.1),
        };
        let movie = EnrichedMovie::merged(base, detail);
        assert_eq!(movie.title(), "detail title");
        assert_eq!(movie.year(), Some(2001));
        assert_eq!(movie.imdb_rating(), Some(8.1));
    }

    #[test]
    fn stub_fields_survive_missing_detail() {
        let movie = EnrichedMovie::from(stub("tt1", "fallback", 1987, 6.4));
        assert_eq!(movie.title(), "fallback");
        assert_eq!(movie.year(), Some(1987));
        assert_eq!(movie.imdb_rating(), Some(6.4));
        assert!(movie.genres().is_empty());
    }

    #[test]
    fn genre_matching_is_case_insensitive() {
        let list = vec!["horror".to_string(), "Drama".to_string()];
        assert!(Genre::Horror.matches(&list));
        assert!(Genre::Drama.matches(&list));
        assert!(!Genre::Comedy.matches(&list));
    }

    #[test]
    fn genre_matching_splits_comma_separated_lists() {
        let list = vec!["Action, Sci-Fi, thriller".to_string()];
        assert!(Genre::SciFi.matches(&list));
        assert!(Genre::Thriller.matches(&list));
        assert!(!Genre::Romance.matches(&list));
    }

    #[test]
    fn rating_source_wire_names_round_trip() {
        let detail = MovieDetail {
            title: String::new(),
            year: None,
            runtime: None,
            plot: String::new(),
            country: String::new(),
            poster: String::new(),
            boxoffice: None,
            genres: Vec::new(),
            ratings: vec![
                Rating {
                    source: "Internet Movie Database".to_string(),
                    value: "8.7".to_string(),
                },
                Rating {
                    source: "Rotten Tomatoes".to_string(),
                    value: "96%".to_string(),
                },
            ],
            principals: Vec::new(),
            imdb_rating: None,
        };
        let movie = EnrichedMovie::merged(stub("tt1", "x", 2000, 1.0), detail);
        assert_eq!(movie.rating(RatingSource::Imdb), Some("8.7"));
        assert_eq!(movie.rating(RatingSource::RottenTomatoes), Some("96%"));
        assert_eq!(movie.rating(RatingSource::Metacritic), None);
    }

    #[test]
    fn filter_year_and_genre_preserves_relative_order() {
        let movies = vec![
            enriched("tt1", "a", 2020, 7.0, &["Horror"]),
            enriched("tt2", "b", 2019, 7.0, &["Horror"]),
            enriched("tt3", "c", 2020, 7.0, &["Comedy"]),
            enriched("tt4", "d", 2020, 7.0, &["horror", "Drama"]),
            enriched("tt5", "e", 2020, 7.0, &["Horror"]),
        ];
        let filters = Filters {
            year: Some(2020),
            genre: Some(Genre::Horror),
            min_rating: None,
        };
        let display = apply_sort_and_filter(&movies, &filters, None);
        let ids: Vec<&str> = display.iter().map(|movie| movie.imdb_id()).collect();
        assert_eq!(ids, vec!["tt1", "tt4", "tt5"]);
    }

    #[test]
    fn filtering_never_mutates_the_fetched_set() {
        let movies = vec![
            enriched("tt1", "b", 2020, 3.0, &["Drama"]),
            enriched("tt2", "a", 2021, 9.0, &["Drama"]),
        ];
        let snapshot = movies.clone();
        let display = apply_sort_and_filter(&movies, &Filters::default(), Some(SortKey::TitleAsc));
        assert_eq!(display[0].imdb_id(), "tt2");
        assert_eq!(movies, snapshot);
    }

    #[test]
    fn sort_by_rating_descending_treats_missing_as_zero() {
        let mut low = enriched("tt1", "a", 2000, 2.0, &[]);
        low.detail.as_mut().unwrap().imdb_rating = None;
        low.stub.imdb_rating = None;
        let movies = vec![low, enriched("tt2", "b", 2000, 8.0, &[])];
        let display =
            apply_sort_and_filter(&movies, &Filters::default(), Some(SortKey::RatingDesc));
        assert_eq!(display[0].imdb_id(), "tt2");
    }

    #[test]
    fn curated_rows_cap_at_ten() {
        let movies: Vec<EnrichedMovie> = (0..15)
            .map(|i| enriched(&format!("tt{i}"), "x", 2000, 9.0, &["Horror"]))
            .collect();
        assert_eq!(top_rated(&movies).len(), 10);
        assert_eq!(horror_picks(&movies).len(), 10);
    }

    #[test]
    fn stub_decodes_lenient_rating_strings() {
        let stub: MovieStub = serde_json::from_str(
            r#"{"imdbID":"tt1","title":"x","year":2001,"imdbRating":"7.2"}"#,
        )
        .unwrap();
        assert_eq!(stub.imdb_rating, Some(7.2));
    }
}
