//! Community board commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, CategorySummary, LikesResponse, NewPost, Post};
use crate::output::{display_content, print_json, print_success, print_table, truncate, OutputFormat};

/// Row for the posts table
#[derive(Tabled, Serialize)]
struct PostRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Likes")]
    likes: u64,
    #[tabled(rename = "Preview")]
    preview: String,
}

/// Row for the categories table
#[derive(Tabled, Serialize)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    id: String,
    #[tabled(rename = "Name")]
    label: String,
    #[tabled(rename = "Posts")]
    posts: usize,
}

fn post_path(category: &str, id: u64) -> String {
    format!("api/v1/posts/{}/{}", category, id)
}

pub async fn list_posts(client: &ApiClient, category: Option<&str>, format: OutputFormat) -> Result<()> {
    let path = match category {
        Some(category) => format!("api/v1/posts?category={}", category),
        None => "api/v1/posts".to_string(),
    };
    let posts: Vec<Post> = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&posts),
        OutputFormat::Table => {
            let rows: Vec<PostRow> = posts
                .into_iter()
                .map(|p| PostRow {
                    id: p.id,
                    category: p.category,
                    title: truncate(&p.title, 40),
                    likes: p.likes,
                    preview: truncate(&display_content(&p.content), 50),
                })
                .collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

pub async fn list_categories(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let categories: Vec<CategorySummary> = client.get("api/v1/categories").await?;
    let rows: Vec<CategoryRow> = categories
        .into_iter()
        .map(|c| CategoryRow {
            id: c.id,
            label: c.label,
            posts: c.posts,
        })
        .collect();
    print_table(&rows, format);
    Ok(())
}

pub async fn show_post(client: &ApiClient, category: &str, id: u64, format: OutputFormat) -> Result<()> {
    let post: Post = client.get(&post_path(category, id)).await?;

    match format {
        OutputFormat::Json => print_json(&post),
        OutputFormat::Table => print_post(&post),
    }
    Ok(())
}

fn print_post(post: &Post) {
    println!("{}", post.title.bold());
    println!("{}", "=".repeat(50));
    println!("ID:        {}", post.id);
    println!("Category:  {}", post.category.cyan());
    println!("Likes:     {}", post.likes.to_string().green());
    println!();
    println!("{}", display_content(&post.content));
}

pub async fn create_post(
    client: &ApiClient,
    title: &str,
    content: &str,
    category: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = NewPost {
        title: title.to_string(),
        content: content.to_string(),
        category: category.to_string(),
    };
    let post: Post = client.post("api/v1/posts", &request).await?;

    match format {
        OutputFormat::Json => print_json(&post),
        OutputFormat::Table => {
            print_success(&format!("Created post {} in {}", post.id, post.category));
        }
    }
    Ok(())
}

pub async fn like_post(client: &ApiClient, category: &str, id: u64, format: OutputFormat) -> Result<()> {
    let response: LikesResponse = client
        .post_empty(&format!("{}/like", post_path(category, id)))
        .await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            print_success(&format!("Post {} now has {} likes", id, response.likes));
        }
    }
    Ok(())
}

pub async fn delete_post(client: &ApiClient, category: &str, id: u64) -> Result<()> {
    client.delete(&post_path(category, id)).await?;
    print_success(&format!("Deleted post {} from {}", id, category));
    Ok(())
}
