use std::sync::Arc;

use crate::api::{self, SessionRefresher};
use crate::catalog::{MovieDetail, MovieStub, PersonDetail, PersonRole};

/// Paged catalog search. Implementations return one page of stubs; an empty
/// page means the end of the result set.
pub trait CatalogService: Send + Sync {
    fn search(
        &self,
        title: Option<&str>,
        year: Option<i32>,
        genre: Option<&str>,
        page: u32,
    ) -> Result<Vec<MovieStub>, api::Error>;
}

pub trait DetailService: Send + Sync {
    fn movie_details(&self, imdb_id: &str) -> Result<MovieDetail, api::Error>;
}

pub trait PersonService: Send + Sync {
    fn person_details(&self, id: &str) -> Result<PersonDetail, api::Error>;
}

pub struct ApiCatalogService {
    client: Arc<api::Client>,
}

impl ApiCatalogService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CatalogService for ApiCatalogService {
    fn search(
        &self,
        title: Option<&str>,
        year: Option<i32>,
        genre: Option<&str>,
        page: u32,
    ) -> Result<Vec<MovieStub>, api::Error> {
        self.client.search_movies(title, year, genre, page)
    }
}

pub struct ApiDetailService {
    client: Arc<api::Client>,
}

impl ApiDetailService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl DetailService for ApiDetailService {
    fn movie_details(&self, imdb_id: &str) -> Result<MovieDetail, api::Error> {
        self.client.movie_details(imdb_id)
    }
}

pub struct ApiPersonService {
    client: Arc<api::Client>,
    session: Arc<dyn SessionRefresher>,
}

impl ApiPersonService {
    pub fn new(client: Arc<api::Client>, session: Arc<dyn SessionRefresher>) -> Self {
        Self { client, session }
    }
}

impl PersonService for ApiPersonService {
    fn person_details(&self, id: &str) -> Result<PersonDetail, api::Error> {
        self.client.person_details(id, self.session.as_ref())
    }
}

#[derive(Default)]
pub struct MockCatalogService;

impl CatalogService for MockCatalogService {
    fn search(
        &self,
        title: Option<&str>,
        _year: Option<i32>,
        _genre: Option<&str>,
        page: u32,
    ) -> Result<Vec<MovieStub>, api::Error> {
        if page > 1 {
            return Ok(Vec::new());
        }
        let wanted = title.unwrap_or("").to_ascii_lowercase();
        Ok(mock_stubs()
            .into_iter()
            .filter(|stub| wanted.is_empty() || stub.title.to_ascii_lowercase().contains(&wanted))
            .collect())
    }
}

#[derive(Default)]
pub struct MockDetailService;

impl DetailService for MockDetailService {
    fn movie_details(&self, imdb_id: &str) -> Result<MovieDetail, api::Error> {
        let stub = mock_stubs()
            .into_iter()
            .find(|stub| stub.imdb_id == imdb_id)
            .ok_or(api::Error::Http { status: 404 })?;
        Ok(MovieDetail {
            title: stub.title,
            year: stub.year,
            runtime: Some(120),
            plot: "Plot details are unavailable in this mock response.".into(),
            country: "USA".into(),
            poster: stub.poster,
            boxoffice: None,
            genres: vec!["Action".into(), "Sci-Fi".into()],
            ratings: Vec::new(),
            principals: Vec::new(),
            imdb_rating: stub.imdb_rating,
        })
    }
}

#[derive(Default)]
pub struct MockPersonService;

impl PersonService for MockPersonService {
    fn person_details(&self, _id: &str) -> Result<PersonDetail, api::Error> {
        Ok(PersonDetail {
            name: "Sample Person".into(),
            birth_year: Some(1960),
            death_year: None,
            roles: vec![PersonRole {
                movie_id: "tt0133093".into(),
                movie_name: "The Matrix".into(),
                category: "actor".into(),
                characters: vec!["Neo".into()],
                imdb_rating: Some(8.7),
            }],
        })
    }
}

fn mock_stubs() -> Vec<MovieStub> {
    vec![
        MovieStub {
            imdb_id: "tt0133093".into(),
            title: "The Matrix".into(),
            year: Some(1999),
            poster: String::new(),
            imdb_rating: Some(8.7),
            classification: Some("M".into()),
        },
        MovieStub {
            imdb_id: "tt0234215".into(),
            title: "The Matrix Reloaded".into(),
            year: Some(2003),
            poster: String::new(),
            imdb_rating: Some(7.2),
            classification: Some("M".into()),
        },
        MovieStub {
            imdb_id: "tt0242653".into(),
            title: "The Matrix Revolutions".into(),
            year: Some(2003),
            poster: String::new(),
            imdb_rating: Some(6.7),
            classification: Some("M".into()),
        },
    ]
}
