//! In-memory backing store for the mock review backend.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub const PAGE_SIZE: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub genre_ids: Vec<u32>,
    pub vote_average: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Review {
    pub id: Uuid,
    pub movie_id: u64,
    pub movie_title: String,
    pub title: String,
    pub body: String,
    pub rating: u8,
    pub author: String,
    pub genre_ids: Vec<u32>,
    pub likes: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: Uuid,
    pub review_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub author: String,
    pub body: String,
    pub likes: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub page: u32,
    pub total_pages: u32,
    pub results: Vec<T>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeStatus {
    pub liked: bool,
    pub likes: u32,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct NewReview {
    pub movie_id: u64,
    pub title: String,
    pub body: String,
    pub rating: u8,
}

#[derive(Deserialize)]
pub struct UpdateReview {
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<u8>,
}

#[derive(Deserialize)]
pub struct NewComment {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

struct Account {
    user: User,
    password: String,
}

/// Which per-user review list an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shelf {
    Favorites,
    WatchLater,
}

pub struct Store {
    movies: Vec<Movie>,
    genres: Vec<Genre>,
    accounts: Vec<Account>,
    tokens: HashMap<String, Uuid>,
    reviews: Vec<Review>,
    comments: Vec<Comment>,
    shelves: HashMap<(Uuid, Shelf), Vec<Uuid>>,
    review_likes: HashSet<(Uuid, Uuid)>,
    comment_likes: HashSet<(Uuid, Uuid)>,
}

impl Default for Store {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Store {
    /// Catalogue of genres and movies plus an `admin`/`admin` account.
    pub fn seeded() -> Self {
        let genres = [
            (28, "Action"),
            (18, "Drama"),
            (878, "Science Fiction"),
            (80, "Crime"),
            (35, "Comedy"),
        ]
        .into_iter()
        .map(|(id, name)| Genre {
            id,
            name: name.to_string(),
        })
        .collect();

        let movies = [
            (155, "The Dark Knight", "2008-07-16", vec![28, 80, 18], 8.5),
            (268, "Batman", "1989-06-21", vec![28], 7.2),
            (27205, "Inception", "2010-07-15", vec![28, 878], 8.4),
            (603, "The Matrix", "1999-03-30", vec![28, 878], 8.2),
            (680, "Pulp Fiction", "1994-09-10", vec![80], 8.5),
            (13, "Forrest Gump", "1994-06-23", vec![35, 18], 8.4),
        ]
        .into_iter()
        .map(|(id, title, date, genre_ids, vote_average)| Movie {
            id,
            title: title.to_string(),
            overview: format!("Overview of {title}."),
            poster_path: Some(format!("/{id}.jpg")),
            release_date: Some(date.to_string()),
            genre_ids,
            vote_average,
        })
        .collect();

        Self {
            movies,
            genres,
            accounts: vec![Account {
                user: User {
                    id: Uuid::new_v4(),
                    username: "admin".to_string(),
                    is_admin: true,
                },
                password: "admin".to_string(),
            }],
            tokens: HashMap::new(),
            reviews: Vec::new(),
            comments: Vec::new(),
            shelves: HashMap::new(),
            review_likes: HashSet::new(),
            comment_likes: HashSet::new(),
        }
    }

    // --- accounts ---

    pub fn register(&mut self, creds: Credentials) -> Result<User, AppError> {
        let username = creds.username.trim();
        if username.is_empty() || creds.password.is_empty() {
            return Err(AppError::BadRequest(
                "username and password are required".to_string(),
            ));
        }
        if self.accounts.iter().any(|a| a.user.username == username) {
            return Err(AppError::Conflict(format!(
                "username {username} is already taken"
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            is_admin: false,
        };
        self.accounts.push(Account {
            user: user.clone(),
            password: creds.password,
        });
        Ok(user)
    }

    pub fn login(&mut self, creds: &Credentials) -> Result<(String, User), AppError> {
        let account = self
            .accounts
            .iter()
            .find(|a| a.user.username == creds.username && a.password == creds.password)
            .ok_or(AppError::InvalidCredentials)?;
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), account.user.id);
        Ok((token, account.user.clone()))
    }

    pub fn logout(&mut self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn user_for_token(&self, token: &str) -> Result<User, AppError> {
        let id = self.tokens.get(token).ok_or(AppError::Unauthorized)?;
        self.accounts
            .iter()
            .find(|a| a.user.id == *id)
            .map(|a| a.user.clone())
            .ok_or(AppError::Unauthorized)
    }

    // --- movies ---

    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }

    pub fn movie(&self, id: u64) -> Result<&Movie, AppError> {
        self.movies
            .iter()
            .find(|m| m.id == id)
            .ok_or(AppError::NotFound("movie"))
    }

    pub fn popular(&self, page: u32) -> Page<Movie> {
        let mut movies = self.movies.clone();
        movies.sort_by(|a, b| {
            b.vote_average
                .total_cmp(&a.vote_average)
                .then(a.id.cmp(&b.id))
        });
        paginate(movies, page)
    }

    pub fn search(&self, query: &str, page: u32) -> Page<Movie> {
        let needle = query.trim().to_lowercase();
        let hits = self
            .movies
            .iter()
            .filter(|m| !needle.is_empty() && m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        paginate(hits, page)
    }

    // --- reviews ---

    pub fn reviews(&self, page: u32, genre: Option<u32>) -> Page<Review> {
        let matching = self
            .reviews
            .iter()
            .filter(|r| genre.map_or(true, |g| r.genre_ids.contains(&g)))
            .cloned()
            .collect();
        paginate(matching, page)
    }

    pub fn review(&self, id: Uuid) -> Result<&Review, AppError> {
        self.reviews
            .iter()
            .find(|r| r.id == id)
            .ok_or(AppError::NotFound("review"))
    }

    pub fn movie_reviews(&self, movie_id: u64) -> Result<Vec<Review>, AppError> {
        self.movie(movie_id)?;
        Ok(self
            .reviews
            .iter()
            .filter(|r| r.movie_id == movie_id)
            .cloned()
            .collect())
    }

    pub fn create_review(&mut self, author: &User, input: NewReview) -> Result<Review, AppError> {
        require_admin(author)?;
        check_rating(input.rating)?;
        let movie = self.movie(input.movie_id)?;
        let review = Review {
            id: Uuid::new_v4(),
            movie_id: movie.id,
            movie_title: movie.title.clone(),
            title: input.title,
            body: input.body,
            rating: input.rating,
            author: author.username.clone(),
            genre_ids: movie.genre_ids.clone(),
            likes: 0,
        };
        self.reviews.push(review.clone());
        Ok(review)
    }

    pub fn update_review(
        &mut self,
        user: &User,
        id: Uuid,
        input: UpdateReview,
    ) -> Result<Review, AppError> {
        require_admin(user)?;
        if let Some(rating) = input.rating {
            check_rating(rating)?;
        }
        let review = self
            .reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(AppError::NotFound("review"))?;
        if let Some(title) = input.title {
            review.title = title;
        }
        if let Some(body) = input.body {
            review.body = body;
        }
        if let Some(rating) = input.rating {
            review.rating = rating;
        }
        Ok(review.clone())
    }

    pub fn delete_review(&mut self, user: &User, id: Uuid) -> Result<(), AppError> {
        require_admin(user)?;
        let before = self.reviews.len();
        self.reviews.retain(|r| r.id != id);
        if self.reviews.len() == before {
            return Err(AppError::NotFound("review"));
        }
        let dropped: HashSet<Uuid> = self
            .comments
            .iter()
            .filter(|c| c.review_id == id)
            .map(|c| c.id)
            .collect();
        self.comments.retain(|c| c.review_id != id);
        self.comment_likes.retain(|(c, _)| !dropped.contains(c));
        self.review_likes.retain(|(r, _)| *r != id);
        for list in self.shelves.values_mut() {
            list.retain(|r| *r != id);
        }
        Ok(())
    }

    // --- favorites / watch later ---

    pub fn shelf(&self, user: &User, shelf: Shelf) -> Vec<Review> {
        self.shelves
            .get(&(user.id, shelf))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.reviews.iter().find(|r| r.id == *id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn shelve(&mut self, user: &User, shelf: Shelf, review_id: Uuid) -> Result<(), AppError> {
        self.review(review_id)?;
        let list = self.shelves.entry((user.id, shelf)).or_default();
        if list.contains(&review_id) {
            let what = match shelf {
                Shelf::Favorites => "already favorited",
                Shelf::WatchLater => "already in watch later",
            };
            return Err(AppError::Conflict(what.to_string()));
        }
        list.push(review_id);
        Ok(())
    }

    pub fn unshelve(&mut self, user: &User, shelf: Shelf, review_id: Uuid) -> Result<(), AppError> {
        let list = self.shelves.entry((user.id, shelf)).or_default();
        let before = list.len();
        list.retain(|r| *r != review_id);
        if list.len() == before {
            return Err(AppError::NotFound("entry"));
        }
        Ok(())
    }

    // --- comments ---

    pub fn comments(&self, review_id: Uuid) -> Result<Vec<Comment>, AppError> {
        self.review(review_id)?;
        Ok(self
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .cloned()
            .collect())
    }

    pub fn add_comment(
        &mut self,
        author: &User,
        review_id: Uuid,
        input: NewComment,
    ) -> Result<Comment, AppError> {
        self.review(review_id)?;
        if input.body.trim().is_empty() {
            return Err(AppError::BadRequest("comment body is empty".to_string()));
        }
        if let Some(parent) = input.parent_id {
            if !self
                .comments
                .iter()
                .any(|c| c.id == parent && c.review_id == review_id)
            {
                return Err(AppError::BadRequest(
                    "parent comment is not on this review".to_string(),
                ));
            }
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            review_id,
            parent_id: input.parent_id,
            author: author.username.clone(),
            body: input.body,
            likes: 0,
        };
        self.comments.push(comment.clone());
        Ok(comment)
    }

    /// Delete a comment and every reply beneath it.
    pub fn delete_comment(&mut self, user: &User, id: Uuid) -> Result<(), AppError> {
        let comment = self
            .comments
            .iter()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound("comment"))?;
        if comment.author != user.username && !user.is_admin {
            return Err(AppError::Forbidden);
        }

        let mut doomed = HashSet::from([id]);
        loop {
            let before = doomed.len();
            for c in &self.comments {
                if c.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(c.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        self.comments.retain(|c| !doomed.contains(&c.id));
        self.comment_likes.retain(|(c, _)| !doomed.contains(c));
        Ok(())
    }

    // --- likes ---

    pub fn like_status(&self, user: &User, review_id: Uuid) -> Result<LikeStatus, AppError> {
        let review = self.review(review_id)?;
        Ok(LikeStatus {
            liked: self.review_likes.contains(&(review_id, user.id)),
            likes: review.likes,
        })
    }

    pub fn toggle_review_like(&mut self, user: &User, review_id: Uuid) -> Result<LikeStatus, AppError> {
        let review = self
            .reviews
            .iter_mut()
            .find(|r| r.id == review_id)
            .ok_or(AppError::NotFound("review"))?;
        let liked = toggle(&mut self.review_likes, (review_id, user.id));
        review.likes = adjust(review.likes, liked);
        Ok(LikeStatus {
            liked,
            likes: review.likes,
        })
    }

    pub fn toggle_comment_like(&mut self, user: &User, id: Uuid) -> Result<LikeStatus, AppError> {
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound("comment"))?;
        let liked = toggle(&mut self.comment_likes, (id, user.id));
        comment.likes = adjust(comment.likes, liked);
        Ok(LikeStatus {
            liked,
            likes: comment.likes,
        })
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn check_rating(rating: u8) -> Result<(), AppError> {
    if (1..=10).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::BadRequest("rating must be between 1 and 10".to_string()))
    }
}

/// Flip membership of `key`; returns whether it is now present.
fn toggle(set: &mut HashSet<(Uuid, Uuid)>, key: (Uuid, Uuid)) -> bool {
    if set.remove(&key) {
        false
    } else {
        set.insert(key);
        true
    }
}

fn adjust(count: u32, liked: bool) -> u32 {
    if liked {
        count + 1
    } else {
        count.saturating_sub(1)
    }
}

/// Pages are 1-based; page 0 is treated as page 1.
fn paginate<T>(items: Vec<T>, page: u32) -> Page<T> {
    let page = page.max(1);
    let total_pages = items.len().div_ceil(PAGE_SIZE).max(1) as u32;
    let results = items
        .into_iter()
        .skip((page as usize - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();
    Page {
        page,
        total_pages,
        results,
    }
}
