//! Page command handlers

use blockpad_core::error::BlockpadError;
use blockpad_core::model::{Block, Page, PageUpdate};
use blockpad_core::storage::BlockStorage;

use crate::cli::args::PageCommands;
use crate::cli::{CliContext, report};

pub fn handle_page_command(ctx: &CliContext, command: PageCommands) -> bool {
    match command {
        PageCommands::List => handle_list(ctx),
        PageCommands::Create { title, icon } => {
            handle_create(ctx, title.as_deref(), icon.as_deref())
        }
        PageCommands::Rename { id, title } => handle_rename(ctx, &id, title),
        PageCommands::Delete { id } => handle_delete(ctx, &id),
        PageCommands::Show { id, json } => handle_show(ctx, &id, json),
    }
}

fn handle_list(ctx: &CliContext) -> bool {
    let session = match ctx.session() {
        Ok(session) => session,
        Err(e) => return report("Error opening storage", &e),
    };

    let pages = session.pages();
    if pages.is_empty() {
        println!("No pages. Create one with 'blockpad page create <title>'.");
        return true;
    }
    for page in pages {
        println!("{}", page_line(page));
    }
    true
}

fn handle_create(ctx: &CliContext, title: Option<&str>, icon: Option<&str>) -> bool {
    let result = ctx
        .session()
        .and_then(|mut session| ctx.block_on(session.create_page(title, icon)));
    match result {
        Ok(page) => {
            println!("✓ Created page {}", page_line(&page));
            true
        }
        Err(e) => report("Error creating page", &e),
    }
}

fn handle_rename(ctx: &CliContext, id: &str, title: String) -> bool {
    let result = ctx
        .session()
        .and_then(|mut session| ctx.block_on(session.rename_page(id, PageUpdate::title(title))));
    match result {
        Ok(page) => {
            println!("✓ Renamed page {}", page_line(&page));
            true
        }
        Err(e) => report("Error renaming page", &e),
    }
}

fn handle_delete(ctx: &CliContext, id: &str) -> bool {
    let result = ctx
        .session()
        .and_then(|mut session| ctx.block_on(session.delete_page(id)));
    match result {
        Ok(true) => {
            println!("✓ Deleted page {}", id);
            true
        }
        Ok(false) => report("Error deleting page", &BlockpadError::PageNotFound(id.to_string())),
        Err(e) => report("Error deleting page", &e),
    }
}

fn handle_show(ctx: &CliContext, id: &str, json: bool) -> bool {
    let result = ctx.storage().and_then(|storage| {
        ctx.block_on(async {
            let page = storage
                .get_page(id)
                .await?
                .ok_or_else(|| BlockpadError::PageNotFound(id.to_string()))?;
            let blocks = storage.list_blocks_for_page(id).await?;
            Ok::<_, BlockpadError>((page, blocks))
        })
    });

    let (page, blocks) = match result {
        Ok(found) => found,
        Err(e) => return report("Error reading page", &e),
    };

    if json {
        return match serde_json::to_string_pretty(&blocks) {
            Ok(text) => {
                println!("{}", text);
                true
            }
            Err(e) => report("Error encoding blocks", &e.into()),
        };
    }

    println!("{}", page_line(&page));
    println!("Updated: {}", page.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    if blocks.is_empty() {
        println!("(no blocks)");
    }
    for block in &blocks {
        println!("{}", block_line(block));
    }
    true
}

fn page_line(page: &Page) -> String {
    match &page.icon {
        Some(icon) => format!("{}  {} {}", page.id, icon, page.title),
        None => format!("{}  {}", page.id, page.title),
    }
}

fn block_line(block: &Block) -> String {
    format!(
        "{:>3}  {:<12} {}  {}",
        block.order,
        block.block_type.as_str(),
        block.id,
        block.content
    )
}
